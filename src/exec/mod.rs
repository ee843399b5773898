// src/exec/mod.rs

//! Action execution layer.
//!
//! - [`backend`] defines the `ActionBackend` trait the orchestrator talks to.
//! - [`shell`] provides `ShellBackend`, which runs the configured actions
//!   with `tokio::process::Command` inside each dependency directory.

pub mod backend;
pub mod shell;

pub use backend::{ActionBackend, DeployRequest};
pub use shell::ShellBackend;
