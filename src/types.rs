use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Boxed, sendable future used at the trait seams (backends, hooks, scheduler).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Order in which an action walks the dependency graph.
///
/// - `Forward`: dependencies before dependents (leaves first).
/// - `Reverse`: dependents before dependencies (top-down pruning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// The orchestration verbs applied to every dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Build,
    Deploy,
    Render,
    Resolve,
    Update,
    Purge,
    Command,
}

impl ActionKind {
    pub fn direction(self) -> Direction {
        match self {
            ActionKind::Purge => Direction::Reverse,
            _ => Direction::Forward,
        }
    }

    /// Capitalised name used in progress messages and hook events
    /// (e.g. `"Build"` in `dependencies.beforeBuild`).
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Build => "Build",
            ActionKind::Deploy => "Deploy",
            ActionKind::Render => "Render",
            ActionKind::Resolve => "Resolve",
            ActionKind::Update => "Update",
            ActionKind::Purge => "Purge",
            ActionKind::Command => "Command",
        }
    }

    /// Lower-case name used in `before:<action>Dependency` events.
    pub fn event_name(self) -> &'static str {
        match self {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Render => "render",
            ActionKind::Resolve => "resolve",
            ActionKind::Update => "update",
            ActionKind::Purge => "purge",
            ActionKind::Command => "command",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mode for storing dependency content hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// Store hashes in a file (`.depdag/cache`).
    File,
    /// Store hashes in memory only (lost on restart).
    Memory,
}

impl Default for HashStorageMode {
    fn default() -> Self {
        HashStorageMode::File
    }
}

impl FromStr for HashStorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(HashStorageMode::File),
            "memory" => Ok(HashStorageMode::Memory),
            other => Err(format!(
                "invalid hash_storage_mode: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}
