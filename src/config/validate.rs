// src/config/validate.rs

use std::sync::LazyLock;

use regex::Regex;

use crate::cache::HashExcludes;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DepdagError, Result};

static DEPENDENCY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("dependency name pattern is valid")
});

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DepdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_dependencies(cfg)?;
    validate_commands(cfg)?;
    validate_hooks(cfg)?;
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, dep) in cfg.dependency.iter() {
        if !DEPENDENCY_NAME.is_match(name) {
            return Err(DepdagError::ConfigError(format!(
                "invalid dependency name '{name}' (allowed: letters, digits, '_', '-', '.')"
            )));
        }
        if dep.path.trim().is_empty() {
            return Err(DepdagError::ConfigError(format!(
                "dependency '{name}' must set a non-empty `path`"
            )));
        }
        HashExcludes::with_globs(dep.hash_exclude.as_slice()).map_err(|err| {
            DepdagError::ConfigError(format!("dependency '{name}': {err:#}"))
        })?;
    }
    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    for (name, command) in cfg.commands.iter() {
        if command.trim().is_empty() {
            return Err(DepdagError::ConfigError(format!(
                "command '{name}' must not be empty"
            )));
        }
    }
    Ok(())
}

fn validate_hooks(cfg: &RawConfigFile) -> Result<()> {
    for (i, hook) in cfg.hooks.iter().enumerate() {
        if hook.events.is_empty() {
            return Err(DepdagError::ConfigError(format!(
                "[[hook]] #{} must list at least one event",
                i + 1
            )));
        }
        if hook.command.trim().is_empty() {
            return Err(DepdagError::ConfigError(format!(
                "[[hook]] #{} must set a non-empty `command`",
                i + 1
            )));
        }
    }
    Ok(())
}
