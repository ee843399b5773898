// src/dependency/resolver.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::SharedHashStore;
use crate::config::{load_dir_config, ConfigFile};
use crate::dependency::{Dependency, DependencyGraph};
use crate::errors::{DepdagError, Result};
use crate::fs::FileSystem;

/// ID of the sentinel root node. Never a valid canonical path.
pub const ROOT_ID: &str = "__root__";

/// Produces the dependency graph that an orchestration run walks.
pub trait Resolver: Send + Sync {
    /// Build a fresh graph. With `update_cache` set, hashes recorded for
    /// dependencies that are no longer part of the graph are dropped.
    fn resolve(&self, update_cache: bool) -> Result<DependencyGraph>;
}

/// Resolves dependencies by following `[dependency.*]` entries from the root
/// config into each dependency directory's own `Depdag.toml`.
pub struct ConfigResolver {
    root_dir: PathBuf,
    config: Arc<ConfigFile>,
    fs: Arc<dyn FileSystem>,
    cache: SharedHashStore,
    allow_cyclic: bool,
}

impl ConfigResolver {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        config: Arc<ConfigFile>,
        fs: Arc<dyn FileSystem>,
        cache: SharedHashStore,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            config,
            fs,
            cache,
            allow_cyclic: false,
        }
    }

    /// Skip edges that would close a cycle instead of failing.
    pub fn allow_cyclic(mut self, allow: bool) -> Self {
        self.allow_cyclic = allow;
        self
    }

    fn resolve_config(
        &self,
        graph: &mut DependencyGraph,
        parent_id: &str,
        parent: Option<&Arc<Dependency>>,
        dir: &Path,
        config: &ConfigFile,
    ) -> Result<()> {
        for (name, dependency_config) in &config.dependency {
            let declared = dir.join(&dependency_config.path);
            let local_path = self.fs.canonicalize(&declared).map_err(|err| {
                DepdagError::ConfigError(format!(
                    "dependency '{name}': cannot resolve path {}: {err:#}",
                    declared.display()
                ))
            })?;
            let id = local_path.to_string_lossy().into_owned();

            let existing = graph
                .get(&id)
                .and_then(|node| node.payload())
                .map(Arc::clone);
            let is_new = existing.is_none();

            let dependency = match existing {
                Some(dependency) => dependency,
                None => {
                    let local_config = load_dir_config(self.fs.as_ref(), &local_path)?;
                    Arc::new(Dependency::new(
                        id.clone(),
                        name.clone(),
                        local_path.clone(),
                        local_config,
                        dependency_config.clone(),
                        parent.is_none(),
                        Arc::clone(&self.fs),
                        Arc::clone(&self.cache),
                    )?)
                }
            };

            match graph.insert_node_at(parent_id, &id, Arc::clone(&dependency)) {
                Ok(_) => {}
                Err(DepdagError::Cyclic(cycle)) if self.allow_cyclic => {
                    warn!(
                        dependency = %name,
                        cycle = %cycle.path.join(" -> "),
                        "skipping cyclic dependency edge"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            }

            match parent {
                Some(parent) => parent.add_child(Arc::clone(&dependency)),
                None => dependency.mark_root(),
            }

            if is_new {
                debug!(dependency = %name, id = %id, "resolved dependency");
                self.resolve_config(
                    graph,
                    &id,
                    Some(&dependency),
                    &local_path,
                    dependency.config(),
                )?;
            }
        }
        Ok(())
    }
}

impl Resolver for ConfigResolver {
    fn resolve(&self, update_cache: bool) -> Result<DependencyGraph> {
        let root_dir = self.fs.canonicalize(&self.root_dir)?;
        let mut graph = DependencyGraph::new(ROOT_ID);
        self.resolve_config(&mut graph, ROOT_ID, None, &root_dir, &self.config)?;

        if update_cache {
            let active: Vec<&str> = graph.ids().collect();
            let mut cache = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cache.prune(&active)?;
            info!(dependencies = active.len(), "updated dependency cache");
        }

        Ok(graph)
    }
}
