// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;
use crate::fs::FileSystem;

/// File name looked up in the project root and in every dependency directory.
pub const CONFIG_FILE_NAME: &str = "Depdag.toml";

/// Load a configuration file and return the raw, unvalidated model.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load and validate a configuration file.
///
/// This is the entry point used by the CLI and the resolver:
/// - reads TOML,
/// - applies serde defaults,
/// - checks dependency names/paths, hook entries and exclude globs.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// Load `<dir>/Depdag.toml`, treating a missing file as an empty config.
pub fn load_dir_config(fs: &dyn FileSystem, dir: &Path) -> Result<ConfigFile> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !fs.is_file(&path) {
        debug!(dir = ?dir, "no config file in dependency directory; using empty config");
        return Ok(ConfigFile::empty());
    }
    let contents = fs.read_to_string(&path)?;
    let raw: RawConfigFile = toml::from_str(&contents)?;
    ConfigFile::try_from(raw)
}
