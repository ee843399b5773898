#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use depdag::config::{ConfigFile, RawConfigFile, CONFIG_FILE_NAME};
use tempfile::TempDir;

/// Builder for a `Depdag.toml` to simplify test setup.
///
/// Produces TOML text so the same builder serves both in-memory configs
/// ([`ConfigFileBuilder::build`]) and on-disk projects
/// ([`ConfigFileBuilder::write_to`]).
#[derive(Debug, Clone, Default)]
pub struct ConfigFileBuilder {
    config: Vec<String>,
    dependencies: Vec<DependencyConfigBuilder>,
    actions: Vec<(String, String)>,
    images: Vec<(String, String)>,
    commands: Vec<(String, String)>,
    hooks: Vec<(Vec<String>, String)>,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.push(format!("max_concurrency = {n}"));
        self
    }

    pub fn memory_cache(mut self) -> Self {
        self.config.push("hash_storage_mode = \"memory\"".to_string());
        self
    }

    pub fn dependency(self, name: &str, path: &str) -> Self {
        self.with_dependency(DependencyConfigBuilder::new(name, path))
    }

    pub fn with_dependency(mut self, dependency: DependencyConfigBuilder) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// `verb` is one of `build`, `deploy`, `render`, `purge`.
    pub fn action(mut self, verb: &str, cmd: &str) -> Self {
        self.actions.push((verb.to_string(), cmd.to_string()));
        self
    }

    pub fn image(mut self, name: &str, tag: &str) -> Self {
        self.images.push((name.to_string(), tag.to_string()));
        self
    }

    pub fn command(mut self, name: &str, cmd: &str) -> Self {
        self.commands.push((name.to_string(), cmd.to_string()));
        self
    }

    pub fn hook(mut self, events: &[&str], cmd: &str) -> Self {
        self.hooks.push((
            events.iter().map(|e| e.to_string()).collect(),
            cmd.to_string(),
        ));
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        if !self.config.is_empty() {
            out.push_str("[config]\n");
            for line in &self.config {
                let _ = writeln!(out, "{line}");
            }
        }
        for dep in &self.dependencies {
            let _ = writeln!(out, "[dependency.{}]", dep.name);
            let _ = writeln!(out, "path = {:?}", dep.path);
            if dep.skip_build {
                out.push_str("skip_build = true\n");
            }
            if !dep.hash_exclude.is_empty() {
                let _ = writeln!(out, "hash_exclude = {:?}", dep.hash_exclude);
            }
        }
        write_table(&mut out, "actions", &self.actions);
        write_table(&mut out, "images", &self.images);
        write_table(&mut out, "commands", &self.commands);
        for (events, cmd) in &self.hooks {
            out.push_str("[[hook]]\n");
            let _ = writeln!(out, "events = {events:?}");
            let _ = writeln!(out, "command = {cmd:?}");
        }
        out
    }

    pub fn build(self) -> ConfigFile {
        let raw: RawConfigFile =
            toml::from_str(&self.to_toml()).expect("builder produced invalid TOML");
        ConfigFile::try_from(raw).expect("Failed to build valid config from builder")
    }

    /// Write `<dir>/Depdag.toml`, creating `dir` if needed.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).expect("create project dir");
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, self.to_toml()).expect("write config");
        path
    }
}

fn write_table(out: &mut String, name: &str, entries: &[(String, String)]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "[{name}]");
    for (key, value) in entries {
        let _ = writeln!(out, "{key} = {value:?}");
    }
}

/// Builder for a `[dependency.<name>]` entry.
#[derive(Debug, Clone)]
pub struct DependencyConfigBuilder {
    name: String,
    path: String,
    skip_build: bool,
    hash_exclude: Vec<String>,
}

impl DependencyConfigBuilder {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            skip_build: false,
            hash_exclude: Vec::new(),
        }
    }

    pub fn skip_build(mut self, val: bool) -> Self {
        self.skip_build = val;
        self
    }

    pub fn hash_exclude(mut self, pattern: &str) -> Self {
        self.hash_exclude.push(pattern.to_string());
        self
    }
}

/// Temporary directory holding a root project and its dependency projects.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp workspace"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a project config at `rel` (relative to the workspace root).
    pub fn project(&self, rel: &str, config: ConfigFileBuilder) -> PathBuf {
        let dir = self.path().join(rel);
        config.write_to(&dir);
        dir
    }

    /// Write (or overwrite) a plain file inside the workspace.
    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn config_path(&self, rel: &str) -> PathBuf {
        self.path().join(rel).join(CONFIG_FILE_NAME)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
