use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::text::DEFAULT_TERMINATOR;

pub const SETTINGS_FILE: &str = "romfields.toml";

/// How schema addresses reach the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// iNES dump with bank-encoded schema addresses
    #[default]
    Nes,
    /// Schema addresses are file offsets
    Flat,
}

/// Editor settings, kept as TOML next to the binary's working directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Copy the previous file to `<name>.bak` before overwriting it
    pub make_backups: bool,
    pub address_mode: AddressMode,
    pub string_terminator: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rom_path: Option<PathBuf>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        EditorSettings {
            make_backups: true,
            address_mode: AddressMode::Nes,
            string_terminator: DEFAULT_TERMINATOR,
            last_rom_path: None,
        }
    }
}

impl EditorSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read settings from `path`; a missing file is created with the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {:?}, writing defaults", path);
                let settings = EditorSettings::default();
                if let Err(e) = settings.save(path) {
                    warn!("Could not create default settings file: {}", e);
                }
                Ok(settings)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
