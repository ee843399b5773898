// src/cache/store.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::types::HashStorageMode;

/// Relative path (from the project root) of the dependency hash cache.
pub const CACHE_FILE_PATH: &str = ".depdag/cache";

/// Storage for the content hash recorded per dependency ID after the last
/// successful forward action.
pub trait HashStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<String>>;
    fn save(&mut self, id: &str, hash: &str) -> Result<()>;
    fn remove(&mut self, id: &str) -> Result<()>;
    /// Drop hashes for IDs that are not in `active_ids`.
    fn prune(&mut self, active_ids: &[&str]) -> Result<()>;
}

/// Hash store shared between concurrently running actions.
pub type SharedHashStore = Arc<Mutex<Box<dyn HashStore>>>;

/// Open the hash store selected in the project config.
pub fn open_store(
    mode: HashStorageMode,
    root: &Path,
    fs: Arc<dyn FileSystem>,
) -> SharedHashStore {
    let store: Box<dyn HashStore> = match mode {
        HashStorageMode::File => Box::new(FileHashStore::new(root.to_path_buf(), fs)),
        HashStorageMode::Memory => Box::new(MemoryHashStore::new()),
    };
    Arc::new(Mutex::new(store))
}

/// Stores hashes in `<root>/.depdag/cache`, one `<id> <hash>` line each.
///
/// IDs may contain whitespace (they are usually paths); the hash is always
/// the last token on a line.
pub struct FileHashStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileHashStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, fs }
    }

    fn path(&self) -> PathBuf {
        self.root.join(CACHE_FILE_PATH)
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        if !self.fs.is_file(&path) {
            return Ok(BTreeMap::new());
        }

        let contents = self.fs.read_to_string(&path)?;
        let map = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.rsplit_once(char::is_whitespace))
            .map(|(id, hash)| (id.trim_end().to_string(), hash.to_string()))
            .collect();
        Ok(map)
    }

    fn save_all(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let mut out = String::new();
        for (id, hash) in map {
            let _ = writeln!(out, "{id} {hash}");
        }
        self.fs.write(&self.path(), out.as_bytes())
    }
}

impl HashStore for FileHashStore {
    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.load_all()?.get(id).cloned())
    }

    fn save(&mut self, id: &str, hash: &str) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(id.to_string(), hash.to_string());
        self.save_all(&map)?;
        debug!(dependency = %id, hash = %hash, "stored dependency hash (file)");
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        let mut map = self.load_all()?;
        if map.remove(id).is_some() {
            self.save_all(&map)?;
        }
        Ok(())
    }

    fn prune(&mut self, active_ids: &[&str]) -> Result<()> {
        let mut map = self.load_all()?;
        let initial_len = map.len();
        map.retain(|k, _| active_ids.contains(&k.as_str()));

        if map.len() < initial_len {
            self.save_all(&map)?;
            info!(
                removed = initial_len - map.len(),
                "pruned stale dependency hashes (file)"
            );
        }
        Ok(())
    }
}

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: HashMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.map.get(id).cloned())
    }

    fn save(&mut self, id: &str, hash: &str) -> Result<()> {
        self.map.insert(id.to_string(), hash.to_string());
        debug!(dependency = %id, hash = %hash, "stored dependency hash (memory)");
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        self.map.remove(id);
        Ok(())
    }

    fn prune(&mut self, active_ids: &[&str]) -> Result<()> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active_ids.contains(&k.as_str()));
        if self.map.len() < initial_len {
            info!(
                removed = initial_len - self.map.len(),
                "pruned stale dependency hashes (memory)"
            );
        }
        Ok(())
    }
}
