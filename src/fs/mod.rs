// src/fs/mod.rs

//! Filesystem access for dependency resolution, the hash cache and directory
//! hashing.
//!
//! Directory listings never follow symlinks: a linked directory is reported
//! as [`EntryKind::Symlink`] with its target, so hashing a dependency cannot
//! wander outside of it or loop.

use std::fmt::Debug;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Link target as stored in the link, unresolved.
    Symlink(PathBuf),
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Replace the file at `path`, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// True for regular files, following symlinks.
    fn is_file(&self, path: &Path) -> bool;

    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Entries of `dir`, sorted by path.
    fn read_dir(&self, dir: &Path) -> Result<Vec<DirEntry>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("resolving {}", path.display()))
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let listing =
            fs::read_dir(dir).with_context(|| format!("listing directory {}", dir.display()))?;

        let mut entries = Vec::new();
        for entry in listing {
            let entry = entry.with_context(|| format!("listing directory {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("inspecting {}", path.display()))?;

            let kind = if file_type.is_symlink() {
                let target = fs::read_link(&path)
                    .with_context(|| format!("reading link {}", path.display()))?;
                EntryKind::Symlink(target)
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(DirEntry { path, kind });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn listing_reports_links_without_following_them() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink("/tmp", dir.path().join("outside")).unwrap();

        let entries = RealFileSystem.read_dir(dir.path()).unwrap();
        let kinds: Vec<(String, EntryKind)> =
            entries.iter().map(|e| (e.name(), e.kind.clone())).collect();

        assert_eq!(
            kinds,
            vec![
                ("a.txt".to_string(), EntryKind::File),
                ("outside".to_string(), EntryKind::Symlink(PathBuf::from("/tmp"))),
                ("src".to_string(), EntryKind::Dir),
            ]
        );
    }
}
