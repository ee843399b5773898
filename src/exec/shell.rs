// src/exec/shell.rs

//! Shell-based action backend.

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::dependency::{Dependency, DependencyLogger};
use crate::errors::{DepdagError, Result};
use crate::exec::backend::{ActionBackend, DeployRequest};
use crate::types::BoxFuture;

/// Where a child's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stdout {
    /// Logged line by line into the dependency logger.
    Log,
    /// Logged and returned to the caller.
    Capture,
    /// Passed straight through to our own stdout/stderr.
    Inherit,
}

/// Runs the `[actions]` / `[commands]` strings of a dependency's config via
/// `sh -c` (`cmd /C` on Windows) inside the dependency directory.
///
/// A missing action is a successful no-op.
#[derive(Debug, Clone, Default)]
pub struct ShellBackend {
    extra_env: BTreeMap<String, String>,
}

impl ShellBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variable set for every spawned command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    async fn run_script(
        &self,
        dependency: &Dependency,
        script: &str,
        env: &[(&str, String)],
        stdout: Stdout,
        log: &DependencyLogger,
    ) -> Result<String> {
        info!(
            dependency = %dependency.name(),
            cmd = %script,
            "starting dependency command"
        );

        let mut cmd = shell_command(script);
        cmd.current_dir(dependency.local_path())
            .env("DEPDAG_DEPENDENCY", dependency.name())
            .env("DEPDAG_DEPENDENCY_PATH", dependency.local_path())
            .envs(&self.extra_env)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if stdout == Stdout::Inherit {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "spawning '{script}' for dependency '{}'",
                dependency.name()
            )
        })?;

        // Always consume stderr so buffers don't fill.
        let stderr_task = child.stderr.take().map(|stderr| {
            let log = log.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.output("stderr", &line);
                }
            })
        });

        let mut captured = String::new();
        if let Some(out) = child.stdout.take() {
            let mut lines = BufReader::new(out).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .context("reading command stdout")?
            {
                log.output("stdout", &line);
                if stdout == Stdout::Capture {
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for '{script}'"))?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let code = status.code().unwrap_or(-1);
        debug!(
            dependency = %dependency.name(),
            exit_code = code,
            success = status.success(),
            "dependency command exited"
        );

        if !status.success() {
            return Err(DepdagError::CommandFailed {
                command: script.to_string(),
                code,
            });
        }
        Ok(captured)
    }
}

impl ActionBackend for ShellBackend {
    fn build<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>>> {
        Box::pin(async move {
            if let Some(script) = dependency.config().actions.build.as_deref() {
                self.run_script(dependency, script, &[], Stdout::Log, log)
                    .await?;
            }
            Ok(dependency.config().images.clone())
        })
    }

    fn deploy<'a>(
        &'a self,
        dependency: &'a Dependency,
        request: DeployRequest,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(script) = dependency.config().actions.deploy.as_deref() else {
                return Ok(());
            };
            let env = [
                ("DEPDAG_FORCE_DEPLOY", request.force_deploy.to_string()),
                ("DEPDAG_BUILT_IMAGES", format_images(&request.built_images)),
            ];
            self.run_script(dependency, script, &env, Stdout::Log, log)
                .await?;
            Ok(())
        })
    }

    fn render<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let Some(script) = dependency.config().actions.render.as_deref() else {
                return Ok(String::new());
            };
            let env = [(
                "DEPDAG_BUILT_IMAGES",
                format_images(&dependency.built_images()),
            )];
            self.run_script(dependency, script, &env, Stdout::Capture, log)
                .await
        })
    }

    fn purge<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(script) = dependency.config().actions.purge.as_deref() {
                self.run_script(dependency, script, &[], Stdout::Log, log)
                    .await?;
            }
            Ok(())
        })
    }

    fn command<'a>(
        &'a self,
        dependency: &'a Dependency,
        command: &'a str,
        args: &'a [String],
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let script = dependency.config().commands.get(command).ok_or_else(|| {
                DepdagError::ConfigError(format!(
                    "couldn't find command '{command}' in dependency {}",
                    dependency.name()
                ))
            })?;

            let mut full = script.clone();
            for arg in args {
                full.push(' ');
                full.push_str(&shell_quote(arg));
            }
            self.run_script(dependency, &full, &[], Stdout::Inherit, log)
                .await?;
            Ok(())
        })
    }
}

fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

/// `name=tag` pairs separated by spaces.
fn format_images(images: &BTreeMap<String, String>) -> String {
    images
        .iter()
        .map(|(name, tag)| format!("{name}={tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe || cfg!(windows) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_unsafe_arguments() {
        assert_eq!(shell_quote("--verbose"), "--verbose");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn images_are_space_separated_pairs() {
        let images = BTreeMap::from([
            ("api".to_string(), "v1".to_string()),
            ("web".to_string(), "v2".to_string()),
        ]);
        assert_eq!(format_images(&images), "api=v1 web=v2");
        assert_eq!(format_images(&BTreeMap::new()), "");
    }
}
