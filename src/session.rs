//! The editing session: one image, one registry, and the operations a user
//! interface calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};

use crate::codec::Value;
use crate::error::{EngineError, Result};
use crate::image::{Image, WriteBatch};
use crate::registry::RecordRegistry;
use crate::resolver::{Resolver, ValueBinding};
use crate::schema::{Category, FieldDescriptor, RecordDescriptor, RecordId};
use crate::settings::EditorSettings;
use crate::validator::{self, Violation};

/// One row of a record view. A field that fails to decode carries its error
/// here instead of failing the whole record.
#[derive(Debug)]
pub struct FieldView<'a> {
    pub field: &'a FieldDescriptor,
    pub addresses: Vec<u32>,
    pub value: Result<Value>,
}

pub struct EditSession {
    image: RwLock<Image>,
    registry: Arc<RecordRegistry>,
    settings: EditorSettings,
    source: Option<PathBuf>,
}

impl EditSession {
    pub fn open(rom_path: &Path, registry: Arc<RecordRegistry>, settings: EditorSettings) -> Result<Self> {
        let image = Image::load(rom_path, settings.address_mode)?;
        info!("Opened {:?} ({} bytes)", rom_path, image.len());
        let mut session = EditSession::from_image(image, registry, settings);
        session.source = Some(rom_path.to_path_buf());
        Ok(session)
    }

    pub fn from_image(image: Image, registry: Arc<RecordRegistry>, settings: EditorSettings) -> Self {
        EditSession {
            image: RwLock::new(image),
            registry,
            settings,
            source: None,
        }
    }

    pub fn registry(&self) -> &RecordRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// File the image was opened from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    // Commit never leaves a partial batch, so a poisoned image is still consistent.
    fn read_image(&self) -> RwLockReadGuard<'_, Image> {
        match self.image.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_image(&self) -> RwLockWriteGuard<'_, Image> {
        self.image.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list_categories(&self) -> Vec<Category> {
        self.registry.categories()
    }

    pub fn list_records(&self, category: Category) -> Vec<&RecordDescriptor> {
        self.registry.list(category)
    }

    pub fn record(&self, id: RecordId) -> Result<&RecordDescriptor> {
        self.registry.get(id)
    }

    /// Fields of `id` (those of the aliased record for an alias), MP first.
    fn fields_of<'a>(&'a self, record: &'a RecordDescriptor) -> Result<Vec<&'a FieldDescriptor>> {
        let owner = self.registry.alias_target(record)?;
        Ok(owner.all_fields().collect())
    }

    fn field_of<'a>(&'a self, record: &'a RecordDescriptor, field_id: &str) -> Result<&'a FieldDescriptor> {
        self.registry
            .alias_target(record)?
            .field(field_id)
            .ok_or_else(|| EngineError::NotFound(format!("field {} of {}", field_id, record.id)))
    }

    pub fn get_field_values(&self, id: RecordId) -> Result<Vec<FieldView<'_>>> {
        let record = self.registry.get(id)?;
        let fields = self.fields_of(record)?;
        let image = self.read_image();
        let resolver = Resolver::new(&self.registry, &image).with_terminator(self.settings.string_terminator);

        let mut views = Vec::with_capacity(fields.len());
        for field in fields {
            let (addresses, value) = match resolver.resolve(record, field) {
                Ok(addresses) => {
                    let value = resolver.decode_at(field, addresses[0]);
                    (addresses, value)
                }
                Err(e) => (vec![], Err(e)),
            };
            if let Err(e) = &value {
                warn!("{}.{}: {}", id, field.id, e);
            }
            views.push(FieldView {
                field,
                addresses,
                value,
            });
        }
        Ok(views)
    }

    /// Resolve and decode one field against the current image.
    pub fn binding(&self, id: RecordId, field_id: &str) -> Result<ValueBinding<'_>> {
        let record = self.registry.get(id)?;
        let field = self.field_of(record, field_id)?;
        let image = self.read_image();
        let resolver = Resolver::new(&self.registry, &image).with_terminator(self.settings.string_terminator);
        let binding = resolver.bind(record, field)?;
        Ok(binding)
    }

    /// Write `value` to every mirror of the field; nothing changes on error.
    pub fn set_field_value(&self, id: RecordId, field_id: &str, value: &Value) -> Result<()> {
        let record = self.registry.get(id)?;
        let field = self.field_of(record, field_id)?;

        let mut image = self.write_image();
        let mut batch = WriteBatch::new();
        Resolver::new(&self.registry, &image)
            .with_terminator(self.settings.string_terminator)
            .stage_write(record, field, value, &mut batch)?;
        let count = batch.commit(&mut image)?;
        debug!("{}.{} = {} ({} byte(s))", id, field_id, value.display_as(field.tag), count);
        Ok(())
    }

    /// Parse user input according to the field's type, then write it.
    pub fn set_field_text(&self, id: RecordId, field_id: &str, input: &str) -> Result<()> {
        let record = self.registry.get(id)?;
        let tag = self.field_of(record, field_id)?.tag;
        let value = Value::parse(input, tag)?;
        self.set_field_value(id, field_id, &value)
    }

    pub fn validate_all(&self) -> Vec<Violation> {
        let image = self.read_image();
        validator::verify(&image, &self.registry, self.settings.string_terminator)
    }

    /// MP cost of a spell, plus the cost of the spell it shares MP with.
    pub fn effective_mp_cost(&self, id: RecordId) -> Result<u32> {
        let own = self.mp_cost(id)?;
        let record = self.registry.get(id)?;
        match record.shares_mp_with {
            Some(linked) => Ok(own + self.mp_cost(linked)?),
            None => Ok(own),
        }
    }

    fn mp_cost(&self, id: RecordId) -> Result<u32> {
        let binding = self.binding(id, "MP")?;
        binding
            .decoded_value
            .as_integer()
            .ok_or_else(|| EngineError::Range(format!("MP of {} is not a number", id)))
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.read_image().bytes().to_vec()
    }

    /// Write the image to `path` once it passes verification.
    ///
    /// The read lock is held from verification to the final rename so no
    /// edit can slip in between.
    pub fn save(&self, path: &Path) -> Result<()> {
        let image = self.read_image();
        let violations = validator::verify(&image, &self.registry, self.settings.string_terminator);
        if !violations.is_empty() {
            for v in &violations {
                warn!("{}", v);
            }
            warn!("Refusing to save {:?}", path);
            return Err(EngineError::SaveRefused(violations.len()));
        }

        if self.settings.make_backups && path.exists() {
            let backup = backup_path(path);
            fs::copy(path, &backup)?;
            debug!("Backup written to {:?}", backup);
        }
        image.write_to(path)?;
        info!("Saved {:?}", path);
        Ok(())
    }
}

/// `<name>.bak` next to `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::settings::AddressMode;
    use crate::test_utils::{flat_image, SAMPLE_SCHEMA};
    use test_log::test;

    fn session(bytes: Vec<u8>) -> EditSession {
        let registry = Arc::new(loader::parse(SAMPLE_SCHEMA).unwrap());
        let settings = EditorSettings {
            address_mode: AddressMode::Flat,
            ..Default::default()
        };
        EditSession::from_image(flat_image(bytes), registry, settings)
    }

    fn id(text: &str) -> RecordId {
        text.parse().unwrap()
    }

    #[test]
    fn test_field_views_keep_going_after_errors() {
        // COMMON_2 has a string with no terminator in a zeroed image
        let s = session(vec![0u8; 0x100]);
        let views = s.get_field_values(id("COMMON_2")).unwrap();
        assert_eq!(views.len(), 2);
        assert!(matches!(views[0].value, Err(EngineError::Truncation { .. })));
        assert_eq!(views[1].value.as_ref().unwrap(), &Value::Integer(0));
    }

    #[test]
    fn test_unknown_field() {
        let s = session(vec![0u8; 0x100]);
        assert!(matches!(
            s.set_field_value(id("SPELL_0"), "9", &Value::Integer(1)),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            s.binding(id("TOOL_7"), "0"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_shared_mp_adds_up() {
        let mut bytes = vec![0u8; 0x100];
        bytes[0x21] = 4; // SPELL_0 MP
        bytes[0x41] = 3; // SPELL_2 MP
        let s = session(bytes);
        assert_eq!(s.effective_mp_cost(id("SPELL_0")).unwrap(), 4);
        assert_eq!(s.effective_mp_cost(id("SPELL_2")).unwrap(), 7);
    }

    #[test]
    fn test_set_field_text_parses_by_type() {
        let s = session(vec![0u8; 0x100]);
        s.set_field_text(id("SPELL_0"), "0", "0x0A").unwrap();
        assert_eq!(
            s.binding(id("SPELL_0"), "0").unwrap().decoded_value,
            Value::Integer(10)
        );
        assert!(s.set_field_text(id("SPELL_0"), "0", "ten").is_err());
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(backup_path(Path::new("/tmp/exodus.nes")), PathBuf::from("/tmp/exodus.nes.bak"));
    }
}
