/// Loading, saving and addressing of real cartridge files.
use romfields::header::{HEADER_SIZE, PRG_BANK_SIZE};
use romfields::loader;
use romfields::session::backup_path;
use romfields::{
    AddressMode, EditSession, EditorSettings, EngineError, Image, RecordId, Value, ViolationKind,
    WriteBatch,
};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use test_log::test;

const SCHEMA: &str = "
[SPELL_0]
NAME=REPEL
ADDRESS=0xD569
DESCRIPTION_0=Damage
OFFSET_0=0x3
TYPE_0=DECIMAL
DESCRIPTION_1=Mirrored range
OFFSET_1=0x5,0x15
TYPE_1=D
";

fn id(text: &str) -> RecordId {
    text.parse().unwrap()
}

/// 16 PRG banks, no CHR, no trainer
fn nes_rom() -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE + 16 * PRG_BANK_SIZE];
    bytes[..4].copy_from_slice(b"NES\x1A");
    bytes[4] = 16;
    bytes
}

fn flat_settings(make_backups: bool) -> EditorSettings {
    EditorSettings {
        make_backups,
        address_mode: AddressMode::Flat,
        ..Default::default()
    }
}

#[test]
fn test_fixed_bank_addresses_in_nes_image() {
    let dir = tempdir().unwrap();
    let rom = dir.path().join("exodus.nes");
    fs::write(&rom, nes_rom()).unwrap();

    let registry = Arc::new(loader::parse(SCHEMA).unwrap());
    let session = EditSession::open(&rom, registry, EditorSettings::default()).unwrap();
    session
        .set_field_value(id("SPELL_0"), "0", &Value::Integer(10))
        .unwrap();

    // 0xD56C lives in the fixed bank at file offset 0x3C010 + 0x156C
    assert_eq!(session.snapshot()[0x3D57C], 0x0A);
    assert_eq!(
        session.binding(id("SPELL_0"), "0").unwrap().resolved_addresses,
        vec![0xD56C]
    );
}

#[test]
fn test_save_writes_backup_first() {
    let dir = tempdir().unwrap();
    let rom = dir.path().join("exodus.bin");
    fs::write(&rom, vec![0u8; 0xE000]).unwrap();

    let registry = Arc::new(loader::parse(SCHEMA).unwrap());
    let session = EditSession::open(&rom, registry, flat_settings(true)).unwrap();
    assert_eq!(session.source(), Some(rom.as_path()));
    session
        .set_field_value(id("SPELL_0"), "1", &Value::Integer(5))
        .unwrap();
    session.save(&rom).unwrap();

    let saved = fs::read(&rom).unwrap();
    assert_eq!(saved[0xD569 + 0x5], 5);
    assert_eq!(saved[0xD569 + 0x15], 5);
    let backup = fs::read(backup_path(&rom)).unwrap();
    assert!(backup.iter().all(|b| *b == 0));
}

#[test]
fn test_save_without_backups() {
    let dir = tempdir().unwrap();
    let rom = dir.path().join("exodus.bin");
    fs::write(&rom, vec![0u8; 0xE000]).unwrap();

    let registry = Arc::new(loader::parse(SCHEMA).unwrap());
    let session = EditSession::open(&rom, registry, flat_settings(false)).unwrap();
    session.save(&rom).unwrap();
    assert!(!backup_path(&rom).exists());
}

#[test]
fn test_inconsistent_image_is_not_saved() {
    let dir = tempdir().unwrap();
    let rom = dir.path().join("exodus.bin");
    let mut bytes = vec![0u8; 0xE000];
    bytes[0xD569 + 0x15] = 9;
    fs::write(&rom, &bytes).unwrap();

    let registry = Arc::new(loader::parse(SCHEMA).unwrap());
    let session = EditSession::open(&rom, registry, flat_settings(true)).unwrap();
    session
        .set_field_value(id("SPELL_0"), "0", &Value::Integer(1))
        .unwrap();

    let out = dir.path().join("edited.bin");
    assert!(matches!(session.save(&out), Err(EngineError::SaveRefused(1))));
    assert!(!out.exists());

    // Writing the mirrored field brings both copies back in step
    session
        .set_field_value(id("SPELL_0"), "1", &Value::Integer(9))
        .unwrap();
    session.save(&out).unwrap();
    assert_eq!(fs::read(&out).unwrap()[0xD56C], 1);
}

#[test]
fn test_out_of_bounds_mirror_blocks_save() {
    let dir = tempdir().unwrap();
    let rom = dir.path().join("small.bin");
    fs::write(&rom, vec![0u8; 0x40]).unwrap();

    let registry = Arc::new(
        loader::parse("[COMMON_0]\nDESCRIPTION_0=Mirrored\nOFFSET_0=0x0,0x100\nTYPE_0=D\n").unwrap(),
    );
    let session = EditSession::open(&rom, registry, flat_settings(false)).unwrap();
    let violations = session.validate_all();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::OutOfBounds);

    let out = dir.path().join("edited.bin");
    assert!(matches!(session.save(&out), Err(EngineError::SaveRefused(1))));
    assert!(!out.exists());
}

#[test]
fn test_failed_commit_restores_every_byte() {
    let mut image = Image::from_bytes(vec![0u8; 0x20], AddressMode::Flat).unwrap();
    let mut batch = WriteBatch::new();
    batch.stage(&image, 0x00, &[1, 2, 3, 4]).unwrap();
    batch.stage(&image, 0x10, &[5, 6, 7, 8]).unwrap();
    // simulated fault part way through the commit
    batch.stage_raw(0x1E, &[9, 9, 9, 9]);

    assert!(matches!(batch.commit(&mut image), Err(EngineError::Address(_))));
    assert!(image.bytes().iter().all(|b| *b == 0));
}

#[test]
fn test_missing_rom() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(loader::parse(SCHEMA).unwrap());
    let result = EditSession::open(&dir.path().join("missing.nes"), registry, flat_settings(true));
    assert!(matches!(result, Err(EngineError::Io(_))));
}

#[test]
fn test_settings_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("romfields.toml");
    let created = EditorSettings::load(&path).unwrap();
    assert_eq!(created, EditorSettings::default());
    assert!(path.exists());

    let changed = flat_settings(false);
    changed.save(&path).unwrap();
    assert_eq!(EditorSettings::load(&path).unwrap(), changed);
}
