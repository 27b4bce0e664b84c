//! Configuration for the shutterboard binary.
//!
//! Reads an optional `board.toml` next to the working directory, layered
//! file → CLI (command-line flags win over file values).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 4710
//! db_path = ".shutterboard/board.db"
//! code_prefix = "BK"
//!
//! [client]
//! base_url = "http://127.0.0.1:4710"
//! debounce_ms = 300
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "board.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub server: ServerSection,
    pub client: ClientSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub db_path: PathBuf,
    pub code_prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 4710,
            db_path: PathBuf::from(".shutterboard/board.db"),
            code_prefix: crate::db::DEFAULT_CODE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub base_url: String,
    pub debounce_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4710".to_string(),
            debounce_ms: 300,
        }
    }
}

impl BoardConfig {
    /// Load configuration. An explicitly given path must exist; the
    /// default `board.toml` is optional and silently falls back to
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}
