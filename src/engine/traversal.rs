// src/engine/traversal.rs

//! Shared traversal state behind the scheduler's work provider.
//!
//! Every provider call takes the lock, selects the next eligible node for
//! the action's direction and marks it visited before releasing the lock, so
//! two workers can never pick the same node.
//!
//! - Forward: post-order, first unvisited node without children. The node is
//!   removed once its action succeeded, which turns its parents into leaves.
//! - Reverse: pre-order, first unvisited node whose only parent is the root.
//!   The node is removed after its action and orphaned children are
//!   re-attached to the root.
//!
//! While nothing is eligible but claimed nodes are still running, callers
//! wait for a completion instead of reporting exhaustion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::dependency::{Dependency, DependencyGraph};
use crate::types::Direction;

#[derive(Debug)]
struct State {
    graph: DependencyGraph,
    visited: HashSet<String>,
    in_flight: usize,
    aborted: bool,
}

#[derive(Debug)]
pub struct Traversal {
    direction: Direction,
    state: Mutex<State>,
    changed: Notify,
}

impl Traversal {
    pub fn new(graph: DependencyGraph, direction: Direction) -> Arc<Self> {
        Arc::new(Self {
            direction,
            state: Mutex::new(State {
                graph,
                visited: HashSet::new(),
                in_flight: 0,
                aborted: false,
            }),
            changed: Notify::new(),
        })
    }

    /// Claim the next eligible dependency, waiting while claimed work is
    /// still running. `None` means the traversal is exhausted or aborted.
    pub async fn next(self: &Arc<Self>) -> Option<Claim> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a completion between the
            // check and the await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.aborted {
                    return None;
                }
                if let Some(dependency) = self.select(&mut state) {
                    state.in_flight += 1;
                    return Some(Claim {
                        traversal: Arc::clone(self),
                        dependency,
                        finished: false,
                    });
                }
                if state.in_flight == 0 {
                    debug!(remaining = state.graph.len(), "traversal exhausted");
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop handing out work. Claimed nodes finish normally.
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.changed.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Nodes still in the graph, excluding the root.
    pub fn remaining(&self) -> usize {
        self.lock().graph.len()
    }

    fn select(&self, state: &mut State) -> Option<Arc<Dependency>> {
        let State { graph, visited, .. } = state;
        let root = graph.root();

        let eligible = |node: &crate::dag::Node<Arc<Dependency>>| {
            if node.index() == root || visited.contains(node.id()) {
                return false;
            }
            match self.direction {
                Direction::Forward => node.is_leaf(),
                Direction::Reverse => node.parents().iter().all(|&p| p == root),
            }
        };

        let found = match self.direction {
            Direction::Forward => graph
                .post_order_search(root, |node| Ok::<_, std::convert::Infallible>(eligible(node))),
            Direction::Reverse => graph
                .pre_order_search(root, |node| Ok::<_, std::convert::Infallible>(eligible(node))),
        }
        .unwrap_or_else(|never| match never {})?;

        let node = graph.node(found)?;
        let dependency = node.payload().map(Arc::clone)?;
        visited.insert(node.id().to_string());
        Some(dependency)
    }

    fn finish(&self, id: &str, succeeded: bool) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);

            let remove = succeeded || self.direction == Direction::Reverse;
            if remove {
                let removed = match self.direction {
                    Direction::Forward => state.graph.remove_node(id).map(|_| ()),
                    Direction::Reverse => state.graph.remove_node_and_reparent(id).map(|_| ()),
                };
                if let Err(err) = removed {
                    warn!(id, error = %err, "failed to remove finished dependency from graph");
                }
            }
        }
        self.changed.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A dependency handed out by [`Traversal::next`].
///
/// Dropping a claim without calling [`Claim::complete`] releases it as
/// failed: forward traversals keep the node (blocking its ancestors).
#[derive(Debug)]
pub struct Claim {
    traversal: Arc<Traversal>,
    dependency: Arc<Dependency>,
    finished: bool,
}

impl Claim {
    pub fn dependency(&self) -> &Arc<Dependency> {
        &self.dependency
    }

    /// Release the claim after the action ran (or was skipped) successfully.
    pub fn complete(mut self) {
        self.finished = true;
        self.traversal.finish(self.dependency.id(), true);
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.finished {
            self.traversal.finish(self.dependency.id(), false);
        }
    }
}
