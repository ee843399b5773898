// src/dependency/mod.rs

//! Dependency payloads and graph resolution.
//!
//! - [`Dependency`] is the per-node record carried by the graph.
//! - [`DependencyLogger`] buffers action output per dependency.
//! - [`resolver`] turns the root config into a [`DependencyGraph`].

pub mod logger;
pub mod resolver;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use tracing::debug;

use crate::cache::{hash_directory, HashExcludes, SharedHashStore};
use crate::config::{ConfigFile, DependencyConfig};
use crate::dag::Graph;
use crate::errors::{DepdagError, Result};
use crate::fs::FileSystem;

pub use logger::DependencyLogger;
pub use resolver::{ConfigResolver, Resolver, ROOT_ID};

/// Graph of resolved dependencies, rooted at [`ROOT_ID`].
pub type DependencyGraph = Graph<Arc<Dependency>>;

/// A resolved sub-project.
///
/// Created by the resolver the first time a dependency directory is reached
/// and shared (through `Arc`) by every path that reaches it again.
pub struct Dependency {
    id: String,
    name: String,
    local_path: PathBuf,
    local_config: ConfigFile,
    dependency_config: DependencyConfig,
    root: AtomicBool,
    hash_excludes: HashExcludes,
    children: Mutex<Vec<Arc<Dependency>>>,
    built_images: Mutex<BTreeMap<String, String>>,
    fs: Arc<dyn FileSystem>,
    cache: SharedHashStore,
}

impl Dependency {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        local_path: PathBuf,
        local_config: ConfigFile,
        dependency_config: DependencyConfig,
        root: bool,
        fs: Arc<dyn FileSystem>,
        cache: SharedHashStore,
    ) -> Result<Self> {
        let name = name.into();
        let hash_excludes = HashExcludes::with_globs(dependency_config.hash_exclude.as_slice())
            .map_err(|err| DepdagError::ConfigError(format!("dependency '{name}': {err:#}")))?;

        Ok(Self {
            id: id.into(),
            name,
            local_path,
            local_config,
            dependency_config,
            root: AtomicBool::new(root),
            hash_excludes,
            children: Mutex::new(Vec::new()),
            built_images: Mutex::new(BTreeMap::new()),
            fs,
            cache,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// The dependency's own `Depdag.toml` (empty if it has none).
    pub fn config(&self) -> &ConfigFile {
        &self.local_config
    }

    /// The `[dependency.<name>]` entry that declared this dependency.
    pub fn dependency_config(&self) -> &DependencyConfig {
        &self.dependency_config
    }

    /// Whether the root project declares this dependency directly.
    pub fn root(&self) -> bool {
        self.root.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_root(&self) {
        self.root.store(true, Ordering::Relaxed);
    }

    pub fn children(&self) -> Vec<Arc<Dependency>> {
        lock(&self.children).clone()
    }

    pub(crate) fn add_child(&self, child: Arc<Dependency>) {
        let mut children = lock(&self.children);
        if !children.iter().any(|c| c.id == child.id) {
            children.push(child);
        }
    }

    /// Images recorded by the last build, image name -> tag.
    pub fn built_images(&self) -> BTreeMap<String, String> {
        lock(&self.built_images).clone()
    }

    pub fn set_built_images(&self, images: BTreeMap<String, String>) {
        *lock(&self.built_images) = images;
    }

    /// Content hash of the dependency directory, ignoring `.git`,
    /// `.depdag` and the configured `hash_exclude` globs.
    pub async fn directory_hash(&self) -> Result<String> {
        let fs = Arc::clone(&self.fs);
        let path = self.local_path.clone();
        let excludes = self.hash_excludes.clone();

        let hash = tokio::task::spawn_blocking(move || {
            hash_directory(fs.as_ref(), &path, &excludes, true)
        })
        .await
        .context("hashing task panicked")??;
        Ok(hash)
    }

    /// Decide whether a forward action has to run.
    ///
    /// Returns `None` when the action can be skipped (not forced and the
    /// directory hash matches the one recorded after the last successful
    /// run), otherwise the fresh hash to record once the action succeeds.
    pub async fn prepare(&self, force: bool) -> Result<Option<String>> {
        let hash = self.directory_hash().await?;
        if force {
            return Ok(Some(hash));
        }

        let cached = lock(&self.cache).load(&self.id)?;
        if cached.as_deref() == Some(hash.as_str()) {
            debug!(dependency = %self.name, hash = %hash, "dependency unchanged");
            return Ok(None);
        }
        Ok(Some(hash))
    }

    pub fn record_hash(&self, hash: &str) -> Result<()> {
        lock(&self.cache).save(&self.id, hash)?;
        Ok(())
    }

    pub fn forget_hash(&self) -> Result<()> {
        lock(&self.cache).remove(&self.id)?;
        Ok(())
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("local_path", &self.local_path)
            .field("root", &self.root())
            .finish_non_exhaustive()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryHashStore;
    use crate::fs::mock::MockFileSystem;

    fn dependency(fs: MockFileSystem) -> Dependency {
        let cache: SharedHashStore = Arc::new(Mutex::new(Box::new(MemoryHashStore::new())));
        Dependency::new(
            "ws/api",
            "api",
            PathBuf::from("ws/api"),
            ConfigFile::empty(),
            DependencyConfig {
                path: "api".into(),
                skip_build: false,
                hash_exclude: vec!["target/**".into()],
            },
            true,
            Arc::new(fs),
            cache,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn prepare_skips_after_hash_is_recorded() {
        let fs = MockFileSystem::new();
        fs.add_file("ws/api/main.rs", "fn main() {}");
        let dep = dependency(fs.clone());

        let hash = dep.prepare(false).await.unwrap().expect("first run must execute");
        dep.record_hash(&hash).unwrap();
        assert_eq!(dep.prepare(false).await.unwrap(), None);
        assert_eq!(dep.prepare(true).await.unwrap(), Some(hash.clone()));

        fs.add_file("ws/api/target/out.bin", "ignored");
        assert_eq!(dep.prepare(false).await.unwrap(), None);

        fs.add_file("ws/api/main.rs", "fn main() { run() }");
        assert!(dep.prepare(false).await.unwrap().is_some());

        dep.forget_hash().unwrap();
        assert!(dep.prepare(false).await.unwrap().is_some());
    }

    #[test]
    fn children_are_deduplicated() {
        let fs = MockFileSystem::new();
        let parent = dependency(fs.clone());
        let child = Arc::new(dependency(fs));
        parent.add_child(Arc::clone(&child));
        parent.add_child(child);
        assert_eq!(parent.children().len(), 1);
    }
}
