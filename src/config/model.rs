// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::HashStorageMode;

/// Configuration as read from a `Depdag.toml` file, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 4
/// hash_storage_mode = "file"
///
/// [dependency.api]
/// path = "../api"
///
/// [actions]
/// build = "make build"
///
/// [commands]
/// test = "make test"
///
/// [[hook]]
/// events = ["before:deployDependencies"]
/// command = "echo deploying"
/// ```
///
/// Every section is optional. The same format is used by the root project
/// and by each dependency directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Declared sub-projects, keyed by dependency name.
    #[serde(default)]
    pub dependency: BTreeMap<String, DependencyConfig>,

    /// What this project does when it is acted upon as a dependency.
    #[serde(default)]
    pub actions: ActionsSection,

    /// Image name -> tag, reported as built images after a build.
    #[serde(default)]
    pub images: BTreeMap<String, String>,

    /// Named commands runnable through `depdag run <dependency> <command>`.
    #[serde(default)]
    pub commands: BTreeMap<String, String>,

    #[serde(default, rename = "hook")]
    pub hooks: Vec<HookConfig>,
}

/// Validated configuration. Construct through `ConfigFile::try_from`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub dependency: BTreeMap<String, DependencyConfig>,
    pub actions: ActionsSection,
    pub images: BTreeMap<String, String>,
    pub commands: BTreeMap<String, String>,
    pub hooks: Vec<HookConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            dependency: raw.dependency,
            actions: raw.actions,
            images: raw.images,
            commands: raw.commands,
            hooks: raw.hooks,
        }
    }

    /// Config used for a dependency directory without a config file.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependency.is_empty()
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Worker count for build/deploy; `0` means "available processing units".
    #[serde(default)]
    pub max_concurrency: usize,

    #[serde(default)]
    pub hash_storage_mode: HashStorageMode,
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            hash_storage_mode: HashStorageMode::default(),
        }
    }
}

/// `[dependency.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    /// Directory of the sub-project, relative to the declaring config.
    pub path: String,

    /// Never build this dependency's images.
    #[serde(default)]
    pub skip_build: bool,

    /// Extra glob patterns ignored by change detection.
    #[serde(default)]
    pub hash_exclude: Vec<String>,
}

/// `[actions]` section. A missing entry makes that action a no-op.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionsSection {
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub deploy: Option<String>,
    #[serde(default)]
    pub render: Option<String>,
    #[serde(default)]
    pub purge: Option<String>,
}

/// `[[hook]]` entry: run `command` whenever one of `events` fires.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    pub events: Vec<String>,
    pub command: String,
}
