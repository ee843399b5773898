use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use depdag::dependency::{Dependency, DependencyLogger};
use depdag::engine::{HookContext, HookDispatcher};
use depdag::errors::{DepdagError, Result};
use depdag::exec::{ActionBackend, DeployRequest};
use depdag::types::BoxFuture;

/// One call observed by [`FakeBackend`], recorded when the call finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub verb: &'static str,
    pub dependency: String,
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<BackendCall>,
    failing: HashSet<(String, String)>,
    rendered: BTreeMap<String, String>,
    running: usize,
    max_running: usize,
}

/// A fake action backend that:
/// - records which dependencies were acted upon, in completion order
/// - optionally sleeps per call to expose parallelism
/// - fails calls registered through [`FakeBackend::fail_on`]
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `verb` (`build`, `deploy`, `render`, `purge`, `command`) fail for
    /// the named dependency.
    pub fn fail_on(&self, verb: &str, dependency: &str) {
        self.lock()
            .failing
            .insert((verb.to_string(), dependency.to_string()));
    }

    /// Manifest returned by `render` for the named dependency.
    pub fn render_as(&self, dependency: &str, manifest: &str) {
        self.lock()
            .rendered
            .insert(dependency.to_string(), manifest.to_string());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Dependency names for one verb, in completion order.
    pub fn calls_for(&self, verb: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.verb == verb)
            .map(|c| c.dependency.clone())
            .collect()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_parallel(&self) -> usize {
        self.lock().max_running
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn record(&self, verb: &'static str, dependency: &Dependency) -> Result<()> {
        {
            let mut state = self.lock();
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = self.lock();
        state.running -= 1;
        let key = (verb.to_string(), dependency.name().to_string());
        if state.failing.contains(&key) {
            return Err(DepdagError::CommandFailed {
                command: format!("fake {verb}"),
                code: 1,
            });
        }
        state.calls.push(BackendCall {
            verb,
            dependency: dependency.name().to_string(),
        });
        Ok(())
    }
}

impl ActionBackend for FakeBackend {
    fn build<'a>(
        &'a self,
        dependency: &'a Dependency,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>>> {
        Box::pin(async move {
            log.info("fake build");
            self.record("build", dependency).await?;
            Ok(dependency.config().images.clone())
        })
    }

    fn deploy<'a>(
        &'a self,
        dependency: &'a Dependency,
        _request: DeployRequest,
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            log.info("fake deploy");
            self.record("deploy", dependency).await
        })
    }

    fn render<'a>(
        &'a self,
        dependency: &'a Dependency,
        _log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.record("render", dependency).await?;
            Ok(self
                .lock()
                .rendered
                .get(dependency.name())
                .cloned()
                .unwrap_or_default())
        })
    }

    fn purge<'a>(
        &'a self,
        dependency: &'a Dependency,
        _log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("purge", dependency).await })
    }

    fn command<'a>(
        &'a self,
        dependency: &'a Dependency,
        command: &'a str,
        args: &'a [String],
        log: &'a DependencyLogger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            log.info(format_args!("fake command {command} {}", args.join(" ")));
            self.record("command", dependency).await
        })
    }
}

/// Hook dispatcher that records every fired event and can be told to fail
/// on one of them.
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    events: Arc<Mutex<Vec<String>>>,
    fail_on: Arc<Mutex<Option<String>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, event: &str) {
        *self.fail_on.lock().unwrap_or_else(|p| p.into_inner()) = Some(event.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn fired(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

impl HookDispatcher for RecordingHooks {
    fn execute<'a>(
        &'a self,
        events: &'a [String],
        _dependency: Option<&'a str>,
        _context: &'a HookContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .extend(events.iter().cloned());

            let fail_on = self.fail_on.lock().unwrap_or_else(|p| p.into_inner()).clone();
            if let Some(event) = fail_on.filter(|e| events.contains(e)) {
                return Err(DepdagError::Hook {
                    event,
                    message: "recording hook failure".to_string(),
                });
            }
            Ok(())
        })
    }
}
