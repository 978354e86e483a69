use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::{EngineError, Result};
use crate::header::InesHeader;
use crate::settings::AddressMode;
use crate::translate::{AddressTranslator, FlatTranslator, NesBankTranslator};

/// The cartridge being edited, with owned memory
#[derive(Debug)]
pub struct Image {
    bytes: Vec<u8>,
    translator: Box<dyn AddressTranslator>,
    header: Option<InesHeader>,
}

impl Image {
    /// Wrap raw file bytes. In `Nes` mode the iNES header must be present.
    pub fn from_bytes(bytes: Vec<u8>, mode: AddressMode) -> Result<Self> {
        match mode {
            AddressMode::Flat => Ok(Image::with_translator(bytes, Box::new(FlatTranslator))),
            AddressMode::Nes => {
                let header = InesHeader::parse(&bytes)?;
                if bytes.len() < header.expected_len() {
                    warn!(
                        "image is {:#x} bytes but the header describes {:#x}",
                        bytes.len(),
                        header.expected_len()
                    );
                }
                let translator = NesBankTranslator::new(header.trainer_size());
                Ok(Image {
                    bytes,
                    translator: Box::new(translator),
                    header: Some(header),
                })
            }
        }
    }

    pub fn with_translator(bytes: Vec<u8>, translator: Box<dyn AddressTranslator>) -> Self {
        Image {
            bytes,
            translator,
            header: None,
        }
    }

    pub fn load(path: &Path, mode: AddressMode) -> Result<Self> {
        debug!("Loading cartridge image: {:?}", path);
        let bytes = fs::read(path)?;
        Image::from_bytes(bytes, mode)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn header(&self) -> Option<&InesHeader> {
        self.header.as_ref()
    }

    /// Physical offset of `addr`, checked so that `len` bytes fit in the image
    pub fn physical(&self, addr: u32, len: usize) -> Result<usize> {
        let offset = self.translator.to_physical(addr)?;
        match offset.checked_add(len.max(1)) {
            Some(end) if end <= self.bytes.len() => Ok(offset),
            _ => Err(EngineError::Address(format!(
                "{:#06x} (+{}) is outside the {:#x}-byte image",
                addr,
                len,
                self.bytes.len()
            ))),
        }
    }

    pub fn read(&self, addr: u32, len: usize) -> Result<&[u8]> {
        let offset = self.physical(addr, len)?;
        Ok(&self.bytes[offset..offset + len])
    }

    /// Everything from `addr` to the end of the image
    pub fn tail(&self, addr: u32) -> Result<&[u8]> {
        let offset = self.physical(addr, 1)?;
        Ok(&self.bytes[offset..])
    }

    pub fn rebase(&self, pointer_addr: u32, target: u32) -> u32 {
        self.translator.rebase(pointer_addr, target)
    }

    /// Persist through a sibling temporary file so a failed write never
    /// leaves a truncated cartridge behind.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
            EngineError::NotFound(format!("{:?} has no file name", path))
        })?;
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        if let Err(e) = fs::write(&tmp, &self.bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {:?}", self.bytes.len(), path);
        Ok(())
    }
}

/// Encoded bytes waiting to be committed to an image in one pass.
#[derive(Debug, Default)]
pub struct WriteBatch {
    writes: Vec<(usize, u8)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch { writes: vec![] }
    }

    /// Stage `bytes` at schema address `addr`, bounds checked now.
    pub fn stage(&mut self, image: &Image, addr: u32, bytes: &[u8]) -> Result<()> {
        let offset = image.physical(addr, bytes.len())?;
        self.stage_raw(offset, bytes);
        Ok(())
    }

    /// Stage bytes at an already physical offset; checked only at commit.
    pub fn stage_raw(&mut self, offset: usize, bytes: &[u8]) {
        self.writes
            .extend(bytes.iter().enumerate().map(|(i, b)| (offset + i, *b)));
    }

    pub fn append(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every staged byte or none of them.
    ///
    /// Previous contents are kept while applying; a failure part way through
    /// puts them back before returning the error.
    pub fn commit(self, image: &mut Image) -> Result<usize> {
        let mut undo: Vec<(usize, u8)> = Vec::with_capacity(self.writes.len());
        for &(offset, byte) in &self.writes {
            match image.bytes.get_mut(offset) {
                Some(slot) => {
                    undo.push((offset, *slot));
                    *slot = byte;
                }
                None => {
                    for (o, old) in undo.into_iter().rev() {
                        image.bytes[o] = old;
                    }
                    warn!("write batch aborted at offset {:#x}, rolled back", offset);
                    return Err(EngineError::Address(format!(
                        "commit offset {:#x} is outside the image",
                        offset
                    )));
                }
            }
        }
        debug!("Committed {} byte(s)", self.writes.len());
        Ok(self.writes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(len: usize) -> Image {
        Image::from_bytes(vec![0u8; len], AddressMode::Flat).unwrap()
    }

    #[test]
    fn test_bounds() {
        let image = flat(16);
        assert!(image.read(15, 1).is_ok());
        assert!(matches!(image.read(15, 2), Err(EngineError::Address(_))));
        assert!(matches!(image.read(16, 1), Err(EngineError::Address(_))));
        assert_eq!(image.tail(14).unwrap().len(), 2);
    }

    #[test]
    fn test_batch_commit() {
        let mut image = flat(8);
        let mut batch = WriteBatch::new();
        batch.stage(&image, 2, &[0xAA, 0xBB]).unwrap();
        batch.stage(&image, 6, &[0xCC]).unwrap();
        assert_eq!(batch.commit(&mut image).unwrap(), 3);
        assert_eq!(image.bytes(), &[0, 0, 0xAA, 0xBB, 0, 0, 0xCC, 0]);
    }

    #[test]
    fn test_batch_rolls_back() {
        let mut image = flat(8);
        let mut batch = WriteBatch::new();
        batch.stage(&image, 0, &[1, 2, 3]).unwrap();
        batch.stage_raw(7, &[4, 5]);
        assert!(batch.commit(&mut image).is_err());
        assert_eq!(image.bytes(), &[0u8; 8]);
    }

    #[test]
    fn test_stage_rejects_out_of_bounds() {
        let image = flat(4);
        let mut batch = WriteBatch::new();
        assert!(batch.stage(&image, 3, &[1, 2]).is_err());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_nes_mode_needs_header() {
        assert!(Image::from_bytes(vec![0u8; 64], AddressMode::Nes).is_err());
        let mut bytes = vec![0u8; 0x10 + 0x4000 * 16];
        bytes[..4].copy_from_slice(b"NES\x1A");
        bytes[4] = 16;
        bytes[0x3C010] = 0x5A;
        let image = Image::from_bytes(bytes, AddressMode::Nes).unwrap();
        assert_eq!(image.read(0xC000, 1).unwrap(), &[0x5A]);
    }
}
