// src/dependency/logger.rs

//! Buffered per-dependency logger.
//!
//! Action output for a dependency is collected in memory so that it can be
//! attached to the error when the action fails. With verbose output enabled
//! each line is also forwarded to `tracing` as it arrives.

use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

#[derive(Clone)]
pub struct DependencyLogger {
    dependency: Arc<str>,
    verbose: bool,
    buffer: Arc<Mutex<String>>,
}

impl DependencyLogger {
    pub fn new(dependency: impl Into<Arc<str>>, verbose: bool) -> Self {
        Self {
            dependency: dependency.into(),
            verbose,
            buffer: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn info(&self, msg: impl Display) {
        let line = msg.to_string();
        if self.verbose {
            info!(dependency = %self.dependency, "{line}");
        }
        self.append("info", &line);
    }

    pub fn warn(&self, msg: impl Display) {
        let line = msg.to_string();
        if self.verbose {
            warn!(dependency = %self.dependency, "{line}");
        }
        self.append("warn", &line);
    }

    /// Record one line of child process output.
    pub fn output(&self, stream: &str, line: &str) {
        if self.verbose {
            info!(dependency = %self.dependency, stream, "{line}");
        }
        self.append(stream, line);
    }

    /// Everything logged so far.
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    fn append(&self, level: &str, line: &str) {
        let mut buffer = self.lock();
        buffer.push('[');
        buffer.push_str(level);
        buffer.push_str("] ");
        buffer.push_str(line);
        buffer.push('\n');
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for DependencyLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyLogger")
            .field("dependency", &self.dependency)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_lines_with_level_prefix() {
        let logger = DependencyLogger::new("api", false);
        logger.info("building");
        logger.output("stderr", "warning: unused");
        logger.warn(format_args!("exit {}", 3));

        assert_eq!(
            logger.contents(),
            "[info] building\n[stderr] warning: unused\n[warn] exit 3\n"
        );
    }

    #[test]
    fn clones_share_one_buffer() {
        let logger = DependencyLogger::new("api", false);
        let clone = logger.clone();
        clone.info("from clone");
        assert!(logger.contents().contains("from clone"));
    }
}
