//! Typed settings, loaded from an optional TOML config file and overridable
//! by CLI flags. Generalizes the old file-existence-only `get_or_create`
//! into an actual settings struct.

use dirs::config_dir;
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config directory not found")]
    NoConfigDir,
    #[error("malformed config.toml: {0}")]
    Malformed(#[from] toml::de::Error),
}

/// Everything a `Node` and the file layer need to start, with every field
/// optional so a partial (or absent) config file only overrides what it
/// actually sets.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub data_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub chunk_size: Option<usize>,
    pub replication_factor: Option<usize>,
}

impl Settings {
    /// Reads `~/.config/shardnet/config.toml` if it exists; an absent file
    /// is not an error, it just yields an all-`None` `Settings`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn config_path() -> Result<PathBuf, ConfigError> {
    let mut dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    dir.push(env!("CARGO_PKG_NAME"));
    std::fs::create_dir_all(&dir)?;
    dir.push(CONFIG_FILE_NAME);
    Ok(dir)
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
}
