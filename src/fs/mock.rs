// src/fs/mock.rs

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::{DirEntry, EntryKind, FileSystem};

#[derive(Debug, Clone)]
enum MockEntry {
    File(Vec<u8>),
    Dir(BTreeSet<String>),
    Symlink(PathBuf),
}

/// In-memory filesystem keyed by path as given (no normalisation).
///
/// Parent directories are created implicitly when a file is added. Clones
/// share the same underlying tree.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.lock()
            .insert(PathBuf::from("."), MockEntry::Dir(BTreeSet::new()));
        fs
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        entries.insert(path.clone(), MockEntry::File(content.into()));
        Self::link_into_parent(&mut entries, &path);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        entries
            .entry(path.clone())
            .or_insert_with(|| MockEntry::Dir(BTreeSet::new()));
        Self::link_into_parent(&mut entries, &path);
    }

    /// Add a link; it is listed but never followed.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        entries.insert(path.clone(), MockEntry::Symlink(target.into()));
        Self::link_into_parent(&mut entries, &path);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `path` as a child of its parent, creating ancestors on the way.
    fn link_into_parent(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if parent == path {
            return;
        }

        let created = !entries.contains_key(parent);
        if created {
            entries.insert(parent.to_path_buf(), MockEntry::Dir(BTreeSet::new()));
        }
        if let (Some(MockEntry::Dir(children)), Some(name)) =
            (entries.get_mut(parent), path.file_name().and_then(|n| n.to_str()))
        {
            children.insert(name.to_string());
        }
        if created {
            Self::link_into_parent(entries, parent);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(_) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File(_)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        if self.lock().contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let entries = self.lock();
        let Some(MockEntry::Dir(children)) = entries.get(dir) else {
            return Err(anyhow!("Not a directory or not found: {:?}", dir));
        };

        Ok(children
            .iter()
            .map(|name| {
                let path = dir.join(name);
                let kind = match entries.get(&path) {
                    Some(MockEntry::Dir(_)) => EntryKind::Dir,
                    Some(MockEntry::Symlink(target)) => EntryKind::Symlink(target.clone()),
                    _ => EntryKind::File,
                };
                DirEntry { path, kind }
            })
            .collect())
    }
}
