// src/config/mod.rs

//! Configuration loading and validation for depdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate names, paths, hooks and exclude globs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_dir_config, load_from_path, CONFIG_FILE_NAME};
pub use model::{
    ActionsSection, ConfigFile, ConfigSection, DependencyConfig, HookConfig, RawConfigFile,
};
