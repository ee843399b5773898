// src/cache/hash.rs

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::fs::{DirEntry, EntryKind, FileSystem};

/// Directory names that never take part in a dependency's content hash:
/// version control and the tool's own state directory.
pub const ALWAYS_EXCLUDED_DIRS: &[&str] = &[".git", ".depdag"];

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Exclusion rules for [`hash_directory`].
///
/// Directory names in [`ALWAYS_EXCLUDED_DIRS`] are skipped at any depth;
/// `globs` are matched against `/`-separated paths relative to the hashed
/// directory.
#[derive(Debug, Clone)]
pub struct HashExcludes {
    dir_names: Vec<String>,
    globs: Option<GlobSet>,
}

impl Default for HashExcludes {
    fn default() -> Self {
        Self {
            dir_names: ALWAYS_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            globs: None,
        }
    }
}

impl HashExcludes {
    /// Default exclusions plus the given glob patterns.
    pub fn with_globs<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut excludes = Self::default();
        if patterns.is_empty() {
            return Ok(excludes);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid hash exclude pattern '{pattern}'"))?;
            builder.add(glob);
        }
        excludes.globs = Some(builder.build().context("building hash exclude set")?);
        Ok(excludes)
    }

    fn is_excluded(&self, rel_path: &str, name: &str, is_dir: bool) -> bool {
        if is_dir && self.dir_names.iter().any(|d| d == name) {
            return true;
        }
        self.globs
            .as_ref()
            .is_some_and(|globs| globs.is_match(rel_path))
    }
}

/// Hash the contents of a directory.
///
/// The digest covers every non-excluded file's relative path and content, in
/// sorted path order, so it only changes when a file is added, removed,
/// renamed or edited. Symlinks are not followed; a link contributes its
/// target path instead of the linked content. With `recursive = false` only
/// the entries directly inside `root` are considered.
pub fn hash_directory(
    fs: &dyn FileSystem,
    root: &Path,
    excludes: &HashExcludes,
    recursive: bool,
) -> Result<String> {
    let mut entries = Vec::new();
    collect_entries(fs, root, root, excludes, recursive, &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    for (rel, entry) in &entries {
        hasher.update(rel.as_bytes());
        hasher.update(&[0]);
        match &entry.kind {
            EntryKind::Symlink(target) => {
                hasher.update(b"link:");
                hasher.update(target.to_string_lossy().as_bytes());
            }
            _ => {
                hasher.update(compute_file_hash(fs, &entry.path)?.as_bytes());
            }
        }
        hasher.update(b"\n");
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(dir = ?root, entries = entries.len(), hash = %hash, "computed directory hash");
    Ok(hash)
}

fn collect_entries(
    fs: &dyn FileSystem,
    root: &Path,
    dir: &Path,
    excludes: &HashExcludes,
    recursive: bool,
    out: &mut Vec<(String, DirEntry)>,
) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        let rel = relative_slash_path(root, &entry.path);
        let is_dir = entry.kind == EntryKind::Dir;

        if excludes.is_excluded(&rel, &entry.name(), is_dir) {
            continue;
        }

        if is_dir {
            if recursive {
                collect_entries(fs, root, &entry.path, excludes, recursive, out)?;
            }
        } else {
            out.push((rel, entry));
        }
    }
    Ok(())
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn project() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("proj/Depdag.toml", "[actions]\nbuild = \"make\"\n");
        fs.add_file("proj/src/lib.rs", "pub fn a() {}");
        fs.add_file("proj/.git/HEAD", "ref: refs/heads/main");
        fs.add_file("proj/.depdag/cache", "x 123");
        fs.add_file("proj/target/out.bin", "binary");
        fs
    }

    #[test]
    fn file_hash_matches_blake3() {
        let fs = MockFileSystem::new();
        fs.add_file("test.txt", b"hello world");
        let hash = compute_file_hash(&fs, Path::new("test.txt")).unwrap();
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn tool_state_and_vcs_changes_do_not_change_hash() {
        let fs = project();
        let excludes = HashExcludes::default();
        let before = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        fs.add_file("proj/.git/HEAD", "ref: refs/heads/other");
        fs.add_file("proj/.depdag/cache", "x 456");
        let after = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn content_change_changes_hash() {
        let fs = project();
        let excludes = HashExcludes::default();
        let before = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        fs.add_file("proj/src/lib.rs", "pub fn b() {}");
        let after = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn globs_exclude_relative_paths() {
        let fs = project();
        let excludes = HashExcludes::with_globs(&["target/**"]).unwrap();
        let before = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        fs.add_file("proj/target/out.bin", "rebuilt");
        let after = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn non_recursive_only_sees_top_level_files() {
        let fs = project();
        let excludes = HashExcludes::default();
        let before = hash_directory(&fs, Path::new("proj"), &excludes, false).unwrap();

        fs.add_file("proj/src/lib.rs", "changed");
        let after = hash_directory(&fs, Path::new("proj"), &excludes, false).unwrap();
        assert_eq!(before, after);

        fs.add_file("proj/Depdag.toml", "changed");
        let changed = hash_directory(&fs, Path::new("proj"), &excludes, false).unwrap();
        assert_ne!(before, changed);
    }

    #[test]
    fn linked_directories_are_not_followed() {
        let fs = project();
        fs.add_symlink("proj/shared", "../shared");
        fs.add_symlink("proj/loop", ".");
        fs.add_file("shared/lib.rs", "pub fn shared() {}");
        let excludes = HashExcludes::default();
        let before = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();

        fs.add_file("shared/lib.rs", "pub fn changed() {}");
        let after = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();
        assert_eq!(before, after);

        fs.add_symlink("proj/shared", "../elsewhere");
        let retargeted = hash_directory(&fs, Path::new("proj"), &excludes, true).unwrap();
        assert_ne!(before, retargeted);
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(HashExcludes::with_globs(&["a[b"]).is_err());
    }
}
