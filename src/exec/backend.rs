// src/exec/backend.rs

//! Pluggable action backend abstraction.
//!
//! The orchestrator never runs processes itself; it asks an
//! `ActionBackend` to build, deploy, render, purge or run a named command
//! for one dependency.
//!
//! - [`ShellBackend`](super::ShellBackend) runs the `[actions]` and
//!   `[commands]` entries of the dependency's `Depdag.toml`.
//! - Tests provide their own backend that records calls and can be told to
//!   fail for specific dependencies.

use std::collections::BTreeMap;

use crate::dependency::{Dependency, DependencyLogger};
use crate::errors::Result;
use crate::types::BoxFuture;

/// Options forwarded to [`ActionBackend::deploy`].
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    /// Redeploy even when the backend considers the deployment current.
    pub force_deploy: bool,
    /// Images built for this dependency in this run, image name -> tag.
    pub built_images: BTreeMap<String, String>,
}

/// Trait abstracting what an action does to a single dependency.
///
/// Every method is invoked at most once per dependency per orchestration
/// run and may be called concurrently for different dependencies.
pub trait ActionBackend: Send + Sync {
    /// Build the dependency and return the images it produced.
    fn build<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>>>;

    fn deploy<'a>(
        &'a self,
        dependency: &'a Dependency,
        request: DeployRequest,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>>;

    /// Render the dependency's manifests and return them.
    fn render<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<String>>;

    fn purge<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>>;

    /// Run the named command from the dependency's `[commands]` table.
    fn command<'a>(
        &'a self,
        dependency: &'a Dependency,
        command: &'a str,
        args: &'a [String],
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>>;
}
