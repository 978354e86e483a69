use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::error::{EngineError, Result};

pub const HEADER_SIZE: usize = 0x10;
pub const TRAINER_SIZE: usize = 0x200;
pub const PRG_BANK_SIZE: usize = 0x4000;
pub const CHR_BANK_SIZE: usize = 0x2000;

const MAGIC: &[u8; 4] = b"NES\x1A";

/// iNES file header (first 16 bytes of the cartridge dump)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InesHeader {
    pub prg_banks: u8,
    pub chr_banks: u8,
    pub mapper: u8,
    pub has_trainer: bool,
    pub battery: bool,
    pub vertical_mirroring: bool,
}

impl InesHeader {
    pub fn parse(bytes: &[u8]) -> Result<InesHeader> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Address(format!(
                "image of {} bytes is too small for an iNES header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(EngineError::Address(
                "missing iNES magic, not a cartridge dump".to_string(),
            ));
        }
        let flags6 = bytes[6];
        let flags7 = bytes[7];
        Ok(InesHeader {
            prg_banks: bytes[4],
            chr_banks: bytes[5],
            mapper: (flags7 & 0xF0) | (flags6 >> 4),
            has_trainer: flags6 & 0x04 != 0,
            battery: flags6 & 0x02 != 0,
            vertical_mirroring: flags6 & 0x01 != 0,
        })
    }

    pub fn trainer_size(&self) -> usize {
        if self.has_trainer {
            TRAINER_SIZE
        } else {
            0
        }
    }

    pub fn prg_size(&self) -> usize {
        self.prg_banks as usize * PRG_BANK_SIZE
    }

    pub fn chr_size(&self) -> usize {
        self.chr_banks as usize * CHR_BANK_SIZE
    }

    /// Expected file length implied by the bank counts
    pub fn expected_len(&self) -> usize {
        HEADER_SIZE + self.trainer_size() + self.prg_size() + self.chr_size()
    }
}

impl Display for InesHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        write!(
            f,
            "
PRG ROM banks:            {} ({:#07x} bytes)
CHR ROM banks:            {} ({:#07x} bytes)
Mapper:                   {}
Trainer:                  {}
Battery-backed RAM:       {}
Mirroring:                {}
Expected file size:       {:#07x}
",
            self.prg_banks,
            self.prg_size(),
            self.chr_banks,
            self.chr_size(),
            self.mapper,
            if self.has_trainer { "yes" } else { "no" },
            if self.battery { "yes" } else { "no" },
            if self.vertical_mirroring {
                "vertical"
            } else {
                "horizontal"
            },
            self.expected_len(),
        )
    }
}
