// src/engine/hooks.rs

//! Lifecycle hooks fired around every dependency action and around each
//! orchestration batch.
//!
//! Event names:
//! - per dependency: `before:buildDependency`, `before:buildDependency:<name>`
//!   and `dependencies.beforeBuild` (likewise `after:` and `error:`),
//! - per batch: `before:buildDependencies`, `after:buildDependencies`,
//!   `error:buildDependencies`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::HookConfig;
use crate::errors::{DepdagError, Result};
use crate::types::{ActionKind, BoxFuture};

/// Key/value context handed to hooks (exported as `DEPDAG_<KEY>`).
pub type HookContext = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Before,
    After,
    Error,
}

impl HookPhase {
    fn prefix(self) -> &'static str {
        match self {
            HookPhase::Before => "before",
            HookPhase::After => "after",
            HookPhase::Error => "error",
        }
    }
}

/// Events fired for a single dependency.
pub fn dependency_events(phase: HookPhase, action: ActionKind, dependency: &str) -> Vec<String> {
    let event = format!("{}:{}Dependency", phase.prefix(), action.event_name());
    vec![
        format!("{event}:{dependency}"),
        event,
        format!("dependencies.{}{}", phase.prefix(), action.name()),
    ]
}

/// Event fired once per orchestration call.
pub fn batch_event(phase: HookPhase, action: ActionKind) -> String {
    format!("{}:{}Dependencies", phase.prefix(), action.event_name())
}

/// Dispatches hook events. Any error aborts further processing.
pub trait HookDispatcher: Send + Sync {
    fn execute<'a>(
        &'a self,
        events: &'a [String],
        dependency: Option<&'a str>,
        context: &'a HookContext,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Dispatcher that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl HookDispatcher for NoopHooks {
    fn execute<'a>(
        &'a self,
        _events: &'a [String],
        _dependency: Option<&'a str>,
        _context: &'a HookContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs the `[[hook]]` commands of the root config whose `events` list
/// contains one of the fired events.
#[derive(Debug, Clone)]
pub struct ShellHooks {
    hooks: Vec<HookConfig>,
    working_dir: PathBuf,
}

impl ShellHooks {
    pub fn new(hooks: Vec<HookConfig>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks,
            working_dir: working_dir.into(),
        }
    }

    async fn run_hook(
        &self,
        hook: &HookConfig,
        event: &str,
        dependency: Option<&str>,
        context: &HookContext,
    ) -> Result<()> {
        info!(event, cmd = %hook.command, "running hook");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&hook.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&hook.command);
            c
        };
        cmd.current_dir(&self.working_dir)
            .env("DEPDAG_EVENT", event)
            .env("DEPDAG_DEPENDENCY_NAME", dependency.unwrap_or_default())
            .envs(context.iter().map(|(k, v)| (env_key(k), v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let status = cmd
            .status()
            .await
            .with_context(|| format!("spawning hook '{}'", hook.command))?;

        if !status.success() {
            return Err(DepdagError::Hook {
                event: event.to_string(),
                message: format!(
                    "command '{}' exited with code {}",
                    hook.command,
                    status.code().unwrap_or(-1)
                ),
            });
        }
        Ok(())
    }
}

impl HookDispatcher for ShellHooks {
    fn execute<'a>(
        &'a self,
        events: &'a [String],
        dependency: Option<&'a str>,
        context: &'a HookContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for hook in &self.hooks {
                let Some(event) = events.iter().find(|e| hook.events.contains(e)) else {
                    continue;
                };
                self.run_hook(hook, event, dependency, context).await?;
            }
            debug!(events = ?events, "hooks dispatched");
            Ok(())
        })
    }
}

fn env_key(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DEPDAG_{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_events_cover_all_forms() {
        let events = dependency_events(HookPhase::Before, ActionKind::Build, "api");
        assert_eq!(
            events,
            vec![
                "before:buildDependency:api",
                "before:buildDependency",
                "dependencies.beforeBuild",
            ]
        );

        let events = dependency_events(HookPhase::Error, ActionKind::Purge, "web");
        assert_eq!(events[2], "dependencies.errorPurge");
    }

    #[test]
    fn batch_events_use_lowercase_action() {
        assert_eq!(
            batch_event(HookPhase::After, ActionKind::Deploy),
            "after:deployDependencies"
        );
    }

    #[test]
    fn context_keys_become_env_names() {
        assert_eq!(env_key("dependency_config_path"), "DEPDAG_DEPENDENCY_CONFIG_PATH");
        assert_eq!(env_key("a.b-c"), "DEPDAG_A_B_C");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_hook_reports_event() {
        let hooks = ShellHooks::new(
            vec![HookConfig {
                events: vec!["before:buildDependency".into()],
                command: "exit 4".into(),
            }],
            std::env::temp_dir(),
        );
        let events = dependency_events(HookPhase::Before, ActionKind::Build, "api");
        let err = hooks
            .execute(&events, Some("api"), &HookContext::new())
            .await
            .unwrap_err();

        match err {
            DepdagError::Hook { event, message } => {
                assert_eq!(event, "before:buildDependency");
                assert!(message.contains("code 4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unmatched_events_run_nothing() {
        let hooks = ShellHooks::new(
            vec![HookConfig {
                events: vec!["after:deployDependencies".into()],
                command: "exit 1".into(),
            }],
            std::env::temp_dir(),
        );
        let events = vec![batch_event(HookPhase::Before, ActionKind::Deploy)];
        hooks
            .execute(&events, None, &HookContext::new())
            .await
            .unwrap();
    }
}
