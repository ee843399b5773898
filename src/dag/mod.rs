// src/dag/mod.rs

//! Dependency graph and the worker pool that walks it.
//!
//! - [`graph`] holds the arena-backed DAG with cycle detection, pre/post
//!   order traversal and node removal.
//! - [`scheduler`] runs a fixed number of workers that pull work from a
//!   shared provider until it reports that nothing is left.

pub mod graph;
pub mod scheduler;

pub use graph::{Graph, Node, NodeIndex};
pub use scheduler::{available_concurrency, work, Scheduler, Work};
