// src/engine/mod.rs

//! Orchestration engine for depdag.
//!
//! This module ties together:
//! - dependency resolution (through a [`Resolver`](crate::dependency::Resolver))
//! - the shared traversal state handed to the worker pool
//! - the per-dependency action wrapper with its lifecycle hooks
//!
//! [`Manager`] is the entry point; every verb (`build_all`, `deploy_all`,
//! `purge_all`, ...) is a thin layer over [`Manager::handle_dependencies`].

pub mod hooks;
pub mod manager;
pub mod options;
pub mod traversal;

pub use hooks::{
    batch_event, dependency_events, HookContext, HookDispatcher, HookPhase, NoopHooks, ShellHooks,
};
pub use manager::{dependency_action, DependencyAction, Manager, RenderOutput};
pub use options::{
    BuildOptions, CommandOptions, DependencyOptions, DeployOptions, HandleOptions, PurgeOptions,
    RenderOptions, ResolveOptions,
};
pub use traversal::{Claim, Traversal};
