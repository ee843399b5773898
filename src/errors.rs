// src/errors.rs

//! Crate-wide error type and helpers.

use std::fmt;

use thiserror::Error;

/// A dependency cycle detected while linking two graph nodes.
///
/// `path` starts at the would-be parent, walks the pre-existing path from the
/// child back down to that parent and therefore ends at the parent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicError {
    pub path: Vec<String>,
}

impl fmt::Display for CyclicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cyclic dependency found: \n{}", self.path.join("\n"))
    }
}

impl std::error::Error for CyclicError {}

#[derive(Error, Debug)]
pub enum DepdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error(transparent)]
    Cyclic(#[from] CyclicError),

    #[error("{0}.\n To allow cyclic dependencies run with the '--allow-cyclic' flag")]
    CyclicHint(CyclicError),

    #[error("resolve dependencies: {0}")]
    Resolve(Box<DepdagError>),

    #[error("{action} dependency {dependency} error {log}")]
    Action {
        action: String,
        dependency: String,
        log: String,
        #[source]
        source: Box<DepdagError>,
    },

    #[error("hook '{event}' failed: {message}")]
    Hook { event: String, message: String },

    #[error("couldn't find dependency {0}")]
    DependencyNotFound(String),

    #[error("command '{command}' exited with code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DepdagError {
    /// The cycle carried by this error, if it is (or wraps) a cycle error.
    pub fn as_cyclic(&self) -> Option<&CyclicError> {
        match self {
            DepdagError::Cyclic(err) | DepdagError::CyclicHint(err) => Some(err),
            DepdagError::Resolve(inner) => inner.as_cyclic(),
            _ => None,
        }
    }

    /// Exit code of the shell command behind this error, looking through
    /// `Action` and `Resolve` wrappers.
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            DepdagError::CommandFailed { code, .. } => Some(*code),
            DepdagError::Action { source, .. } => source.command_exit_code(),
            DepdagError::Resolve(inner) => inner.command_exit_code(),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DepdagError>;
