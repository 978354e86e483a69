//! Mapping from schema addresses to byte offsets in the loaded file.

use std::fmt::Debug;

use crate::error::{EngineError, Result};
use crate::header::{HEADER_SIZE, PRG_BANK_SIZE};

/// Turns a schema address into a physical offset inside the image buffer.
pub trait AddressTranslator: Debug + Send + Sync {
    fn to_physical(&self, addr: u32) -> Result<usize>;

    /// Schema address designated by a pointer value read at `pointer_addr`.
    fn rebase(&self, _pointer_addr: u32, target: u32) -> u32 {
        target
    }
}

/// Schema addresses are file offsets.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatTranslator;

impl AddressTranslator for FlatTranslator {
    fn to_physical(&self, addr: u32) -> Result<usize> {
        Ok(addr as usize)
    }
}

const FIXED_BANK: u32 = 0xF;
const FIXED_BANK_START: u32 = 0xC000;
const SWITCHABLE_START: u32 = 0x8000;

/// MMC1 layout: bank 0xF is fixed at $C000-$FFFF, banks 0x0-0xE switch in at $8000.
///
/// Schema addresses carry the bank in bits 16-19: `0x0C8D76` is bank $0C, $8D76.
/// CPU addresses at or above $C000 always land in the fixed bank.
#[derive(Debug, Default, Clone, Copy)]
pub struct NesBankTranslator {
    pub trainer_size: usize,
}

impl NesBankTranslator {
    pub fn new(trainer_size: usize) -> Self {
        NesBankTranslator { trainer_size }
    }

    pub fn split(addr: u32) -> (u32, u32) {
        (addr >> 16, addr & 0xFFFF)
    }
}

impl AddressTranslator for NesBankTranslator {
    fn to_physical(&self, addr: u32) -> Result<usize> {
        let (bank, cpu) = NesBankTranslator::split(addr);
        let base = HEADER_SIZE + self.trainer_size;
        if cpu >= FIXED_BANK_START {
            Ok(base + (FIXED_BANK as usize * PRG_BANK_SIZE) + (cpu - FIXED_BANK_START) as usize)
        } else if cpu >= SWITCHABLE_START {
            Ok(base + bank as usize * PRG_BANK_SIZE + (cpu - SWITCHABLE_START) as usize)
        } else {
            Err(EngineError::Address(format!(
                "{:02X}:{:04X} is not in cartridge ROM space",
                bank, cpu
            )))
        }
    }

    fn rebase(&self, pointer_addr: u32, target: u32) -> u32 {
        let (bank, _) = NesBankTranslator::split(pointer_addr);
        if target >= FIXED_BANK_START {
            target
        } else {
            (bank << 16) | target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bank() {
        let t = NesBankTranslator::new(0);
        assert_eq!(t.to_physical(0xD569).unwrap(), 0x3C010 + 0x1569);
        // bank bits are ignored above $C000
        assert_eq!(t.to_physical(0x03D569).unwrap(), 0x3C010 + 0x1569);
    }

    #[test]
    fn test_switchable_bank() {
        let t = NesBankTranslator::new(0);
        assert_eq!(t.to_physical(0x0C8D76).unwrap(), 0xC * 0x4000 + 0x10 + 0xD76);
        assert_eq!(t.to_physical(0x8000).unwrap(), 0x10);
        let with_trainer = NesBankTranslator::new(0x200);
        assert_eq!(with_trainer.to_physical(0x8000).unwrap(), 0x210);
    }

    #[test]
    fn test_ram_address_rejected() {
        let t = NesBankTranslator::new(0);
        assert!(matches!(t.to_physical(0x0300), Err(EngineError::Address(_))));
    }

    #[test]
    fn test_rebase_keeps_bank() {
        let t = NesBankTranslator::new(0);
        assert_eq!(t.rebase(0x0C8D76, 0x9000), 0x0C9000);
        assert_eq!(t.rebase(0x0C8D76, 0xE000), 0xE000);
        assert_eq!(FlatTranslator.rebase(0x0C8D76, 0x9000), 0x9000);
    }
}
