// src/engine/manager.rs

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigFile, CONFIG_FILE_NAME};
use crate::dag::{work, Scheduler};
use crate::dependency::{Dependency, DependencyGraph, DependencyLogger, Resolver};
use crate::engine::hooks::{
    batch_event, dependency_events, HookContext, HookDispatcher, HookPhase, NoopHooks,
};
use crate::engine::options::{
    BuildOptions, CommandOptions, DependencyOptions, DeployOptions, HandleOptions, PurgeOptions,
    RenderOptions, ResolveOptions,
};
use crate::engine::traversal::{Claim, Traversal};
use crate::errors::{DepdagError, Result};
use crate::exec::{ActionBackend, DeployRequest};
use crate::types::{ActionKind, BoxFuture};

/// Per-dependency action invoked by [`Manager::handle_dependencies`].
pub type DependencyAction =
    Arc<dyn Fn(Arc<Dependency>, DependencyLogger) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`DependencyAction`].
pub fn dependency_action<F, Fut>(f: F) -> DependencyAction
where
    F: Fn(Arc<Dependency>, DependencyLogger) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(
        move |dependency: Arc<Dependency>, log: DependencyLogger| -> BoxFuture<'static, Result<()>> {
            Box::pin(f(dependency, log))
        },
    )
}

/// Sink for rendered manifests.
pub type RenderOutput = Arc<Mutex<Box<dyn Write + Send>>>;

/// Applies actions to every dependency of a project in dependency order.
pub struct Manager {
    config: Arc<ConfigFile>,
    resolver: Arc<dyn Resolver>,
    backend: Arc<dyn ActionBackend>,
    hooks: Arc<dyn HookDispatcher>,
    render_output: RenderOutput,
}

impl Manager {
    pub fn new(
        config: Arc<ConfigFile>,
        resolver: Arc<dyn Resolver>,
        backend: Arc<dyn ActionBackend>,
    ) -> Self {
        Self {
            config,
            resolver,
            backend,
            hooks: Arc::new(NoopHooks),
            render_output: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HookDispatcher>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_render_output(mut self, output: RenderOutput) -> Self {
        self.render_output = output;
        self
    }

    /// Re-resolve all dependencies and refresh the dependency cache.
    pub async fn update_all(&self) -> Result<()> {
        if !self.config.has_dependencies() {
            return Ok(());
        }

        info!("Update dependencies");
        match self.resolve(true).await {
            Ok(_) => Ok(()),
            Err(DepdagError::Cyclic(cycle)) => Err(DepdagError::CyclicHint(cycle)),
            Err(err) => Err(err),
        }
    }

    /// Walk the graph in dependency order without acting on anything.
    pub async fn resolve_all(&self, options: ResolveOptions) -> Result<Vec<Arc<Dependency>>> {
        let action = dependency_action(|_, _| async { Ok(()) });
        let handle = HandleOptions {
            dependencies: options.dependencies,
            silent: options.silent,
            concurrency: 1,
        };
        self.with_batch_hooks(
            ActionKind::Resolve,
            self.handle_dependencies(ActionKind::Resolve, handle, action),
        )
        .await
    }

    pub async fn build_all(&self, options: BuildOptions) -> Result<Vec<Arc<Dependency>>> {
        let backend = Arc::clone(&self.backend);
        let force = options.force_dependencies;
        let action = dependency_action(move |dependency, log| {
            let backend = Arc::clone(&backend);
            async move { build_dependency(backend.as_ref(), &dependency, force, &log).await }
        });

        let handle = HandleOptions {
            dependencies: options.dependencies,
            silent: false,
            concurrency: self.concurrency(options.max_concurrency),
        };
        self.with_batch_hooks(
            ActionKind::Build,
            self.handle_dependencies(ActionKind::Build, handle, action),
        )
        .await
    }

    pub async fn deploy_all(&self, options: DeployOptions) -> Result<Vec<Arc<Dependency>>> {
        let backend = Arc::clone(&self.backend);
        let flags = DeployFlags {
            force_dependencies: options.force_dependencies,
            skip_build: options.skip_build,
            skip_deploy: options.skip_deploy,
            force_deploy: options.force_deploy,
        };
        let action = dependency_action(move |dependency, log| {
            let backend = Arc::clone(&backend);
            async move { deploy_dependency(backend.as_ref(), &dependency, flags, &log).await }
        });

        let handle = HandleOptions {
            dependencies: options.dependencies,
            silent: false,
            concurrency: self.concurrency(options.max_concurrency),
        };
        self.with_batch_hooks(
            ActionKind::Deploy,
            self.handle_dependencies(ActionKind::Deploy, handle, action),
        )
        .await
    }

    /// Purge dependents before their dependencies.
    pub async fn purge_all(&self, options: PurgeOptions) -> Result<Vec<Arc<Dependency>>> {
        let backend = Arc::clone(&self.backend);
        let action = dependency_action(move |dependency, log| {
            let backend = Arc::clone(&backend);
            async move { purge_dependency(backend.as_ref(), &dependency, &log).await }
        });

        let handle = HandleOptions {
            dependencies: DependencyOptions {
                skip_dependencies: options.skip_dependencies,
                dependencies: options.dependencies,
                update_dependencies: false,
                verbose: options.verbose,
            },
            silent: false,
            concurrency: 1,
        };
        self.with_batch_hooks(
            ActionKind::Purge,
            self.handle_dependencies(ActionKind::Purge, handle, action),
        )
        .await
    }

    pub async fn render_all(&self, options: RenderOptions) -> Result<Vec<Arc<Dependency>>> {
        let backend = Arc::clone(&self.backend);
        let output = Arc::clone(&self.render_output);
        let skip_build = options.skip_build;
        let action = dependency_action(move |dependency, log| {
            let backend = Arc::clone(&backend);
            let output = Arc::clone(&output);
            async move {
                render_dependency(backend.as_ref(), &dependency, skip_build, &output, &log).await
            }
        });

        let handle = HandleOptions {
            dependencies: options.dependencies,
            silent: false,
            concurrency: 1,
        };
        self.with_batch_hooks(
            ActionKind::Render,
            self.handle_dependencies(ActionKind::Render, handle, action),
        )
        .await
    }

    /// Run a named command of one dependency.
    pub async fn command(&self, options: CommandOptions) -> Result<()> {
        let found = Arc::new(AtomicBool::new(false));
        let backend = Arc::clone(&self.backend);
        let command: Arc<str> = options.command.into();
        let args: Arc<[String]> = options.args.into();

        let action = {
            let found = Arc::clone(&found);
            dependency_action(move |dependency, log| {
                let backend = Arc::clone(&backend);
                let found = Arc::clone(&found);
                let command = Arc::clone(&command);
                let args = Arc::clone(&args);
                async move {
                    found.store(true, Ordering::SeqCst);
                    backend.command(&dependency, &command, &args, &log).await
                }
            })
        };

        let handle = HandleOptions {
            dependencies: DependencyOptions {
                skip_dependencies: Vec::new(),
                dependencies: vec![options.dependency.clone()],
                update_dependencies: options.update_dependencies,
                verbose: options.verbose,
            },
            silent: true,
            concurrency: 1,
        };
        let result = self
            .handle_dependencies(ActionKind::Command, handle, action)
            .await;

        if !found.load(Ordering::SeqCst) {
            return Err(DepdagError::DependencyNotFound(options.dependency));
        }
        result.map(|_| ())
    }

    /// Resolve the graph and apply `perform` to every selected dependency,
    /// in the order given by the action's direction.
    ///
    /// Returns the executed dependencies that the root project declares
    /// directly; their descendants are reachable through
    /// [`Dependency::children`].
    pub async fn handle_dependencies(
        &self,
        action: ActionKind,
        options: HandleOptions,
        perform: DependencyAction,
    ) -> Result<Vec<Arc<Dependency>>> {
        if !self.config.has_dependencies() {
            return Ok(Vec::new());
        }

        let HandleOptions {
            dependencies: select,
            silent,
            concurrency,
        } = options;

        if !silent {
            info!("Start resolving dependencies");
        }
        let graph = self
            .resolve(select.update_dependencies)
            .await
            .map_err(|err| match err {
                DepdagError::Cyclic(cycle) => {
                    DepdagError::Resolve(Box::new(DepdagError::CyclicHint(cycle)))
                }
                other => DepdagError::Resolve(Box::new(other)),
            })?;

        let total = graph.len();
        if !silent {
            info!("Resolved {total} dependencies");
            if !select.verbose {
                info!("To display the complete dependency execution log run with the '--verbose-dependencies' flag");
            }
            let selected = if select.dependencies.is_empty() {
                total
            } else {
                select.dependencies.len()
            };
            info!("{} {selected} dependencies", action.name());
        }

        let traversal = Traversal::new(graph, action.direction());
        let runner = Arc::new(NodeRunner {
            action,
            hooks: Arc::clone(&self.hooks),
            traversal: Arc::clone(&traversal),
            perform,
            select,
            silent,
            executed: Mutex::new(Vec::new()),
        });

        let scheduler = Scheduler::new(concurrency, {
            let runner = Arc::clone(&runner);
            move || {
                let runner = Arc::clone(&runner);
                async move {
                    let claim = runner.traversal.next().await;
                    Ok::<_, DepdagError>(claim.map(|claim| work(Arc::clone(&runner).run(claim))))
                }
            }
        });
        debug!(
            action = %action,
            concurrency = scheduler.concurrency(),
            "scheduling dependencies"
        );

        let outcome = scheduler.run().await;
        let executed = runner.take_executed();

        if let Err(err) = outcome {
            if !silent {
                warn!(
                    executed = executed.len(),
                    remaining = traversal.remaining(),
                    "{} dependencies failed",
                    action.name()
                );
            }
            return Err(err);
        }

        if !silent {
            if executed.is_empty() {
                info!("No dependency processed");
            } else {
                info!("Successfully processed {} dependencies", executed.len());
            }
        }

        Ok(executed.into_iter().filter(|d| d.root()).collect())
    }

    async fn resolve(&self, update_cache: bool) -> Result<DependencyGraph> {
        let resolver = Arc::clone(&self.resolver);
        tokio::task::spawn_blocking(move || resolver.resolve(update_cache))
            .await
            .map_err(|err| DepdagError::Other(anyhow!("resolver task failed: {err}")))?
    }

    async fn with_batch_hooks<F>(&self, action: ActionKind, run: F) -> Result<Vec<Arc<Dependency>>>
    where
        F: Future<Output = Result<Vec<Arc<Dependency>>>>,
    {
        let before = [batch_event(HookPhase::Before, action)];
        self.hooks.execute(&before, None, &HookContext::new()).await?;

        match run.await {
            Ok(dependencies) => {
                let names = dependencies
                    .iter()
                    .map(|d| d.name())
                    .collect::<Vec<_>>()
                    .join(",");
                let context = HookContext::from([("dependencies".to_string(), names)]);
                let after = [batch_event(HookPhase::After, action)];
                self.hooks.execute(&after, None, &context).await?;
                Ok(dependencies)
            }
            Err(err) => {
                let context = HookContext::from([("error".to_string(), err.to_string())]);
                let failed = [batch_event(HookPhase::Error, action)];
                self.hooks.execute(&failed, None, &context).await?;
                Err(err)
            }
        }
    }

    fn concurrency(&self, requested: usize) -> usize {
        if requested > 0 {
            requested
        } else {
            self.config.config.max_concurrency
        }
    }
}

/// Runs the per-dependency wrapper for one orchestration call.
struct NodeRunner {
    action: ActionKind,
    hooks: Arc<dyn HookDispatcher>,
    traversal: Arc<Traversal>,
    perform: DependencyAction,
    select: DependencyOptions,
    silent: bool,
    executed: Mutex<Vec<Arc<Dependency>>>,
}

impl NodeRunner {
    async fn run(self: Arc<Self>, claim: Claim) -> Result<()> {
        let dependency = Arc::clone(claim.dependency());
        let name = dependency.name();

        if !is_selected(name, &self.select.dependencies) {
            claim.complete();
            return Ok(());
        }
        if self.select.skip_dependencies.iter().any(|s| s == name) {
            info!("Skip dependency {name}");
            claim.complete();
            return Ok(());
        }

        let log = DependencyLogger::new(name, self.select.verbose);
        let context = hook_context(&dependency);

        self.fire(HookPhase::Before, name, &context).await?;

        if let Err(err) = (self.perform)(Arc::clone(&dependency), log.clone()).await {
            self.fire(HookPhase::Error, name, &context).await?;
            return Err(DepdagError::Action {
                action: self.action.name().to_string(),
                dependency: name.to_string(),
                log: log.contents(),
                source: Box::new(err),
            });
        }

        self.fire(HookPhase::After, name, &context).await?;

        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(&dependency));
        if !self.silent {
            info!("{} dependency {name} completed", self.action.name());
        }

        claim.complete();
        Ok(())
    }

    /// Fire per-dependency hooks; a failing hook stops the traversal.
    async fn fire(&self, phase: HookPhase, name: &str, context: &HookContext) -> Result<()> {
        let events = dependency_events(phase, self.action, name);
        if let Err(err) = self.hooks.execute(&events, Some(name), context).await {
            self.traversal.abort();
            return Err(err);
        }
        Ok(())
    }

    fn take_executed(&self) -> Vec<Arc<Dependency>> {
        std::mem::take(
            &mut *self
                .executed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

fn is_selected(name: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|f| f == name)
}

fn hook_context(dependency: &Dependency) -> HookContext {
    let path = dependency.local_path();
    HookContext::from([
        ("dependency_name".to_string(), dependency.name().to_string()),
        ("dependency_id".to_string(), dependency.id().to_string()),
        ("dependency_path".to_string(), path.display().to_string()),
        (
            "dependency_config_path".to_string(),
            path.join(CONFIG_FILE_NAME).display().to_string(),
        ),
    ])
}

#[derive(Debug, Clone, Copy)]
struct DeployFlags {
    force_dependencies: bool,
    skip_build: bool,
    skip_deploy: bool,
    force_deploy: bool,
}

async fn build_images(
    backend: &dyn ActionBackend,
    dependency: &Dependency,
    skip_build: bool,
    log: &DependencyLogger,
) -> Result<BTreeMap<String, String>> {
    if skip_build || dependency.dependency_config().skip_build {
        log.info("skip building images");
        return Ok(BTreeMap::new());
    }

    let images = backend.build(dependency, log).await?;
    dependency.set_built_images(images.clone());
    Ok(images)
}

async fn build_dependency(
    backend: &dyn ActionBackend,
    dependency: &Dependency,
    force: bool,
    log: &DependencyLogger,
) -> Result<()> {
    let Some(hash) = dependency.prepare(force).await? else {
        log.info("dependency unchanged since last build");
        return Ok(());
    };

    build_images(backend, dependency, false, log).await?;
    dependency.record_hash(&hash)
}

async fn deploy_dependency(
    backend: &dyn ActionBackend,
    dependency: &Dependency,
    flags: DeployFlags,
    log: &DependencyLogger,
) -> Result<()> {
    let Some(hash) = dependency.prepare(flags.force_dependencies).await? else {
        log.info("dependency unchanged since last deploy");
        return Ok(());
    };

    let built_images = build_images(backend, dependency, flags.skip_build, log).await?;
    if !flags.skip_deploy {
        let request = DeployRequest {
            force_deploy: flags.force_deploy,
            built_images,
        };
        backend.deploy(dependency, request, log).await?;
    }

    dependency.record_hash(&hash)
}

async fn render_dependency(
    backend: &dyn ActionBackend,
    dependency: &Dependency,
    skip_build: bool,
    output: &RenderOutput,
    log: &DependencyLogger,
) -> Result<()> {
    build_images(backend, dependency, skip_build, log).await?;
    let rendered = backend.render(dependency, log).await?;

    let mut out = output
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    out.write_all(rendered.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Purge failures are logged, never returned; the cached hash is dropped
/// either way so the next deploy runs.
async fn purge_dependency(
    backend: &dyn ActionBackend,
    dependency: &Dependency,
    log: &DependencyLogger,
) -> Result<()> {
    if let Err(err) = backend.purge(dependency, log).await {
        error!(dependency = %dependency.name(), error = %err, "error purging dependency");
        log.warn(format_args!("Error purging dependency {}: {err}", dependency.id()));
    }
    if let Err(err) = dependency.forget_hash() {
        log.warn(format_args!("Error removing cached hash: {err}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_selects_everything() {
        assert!(is_selected("api", &[]));
        assert!(is_selected("api", &["web".into(), "api".into()]));
        assert!(!is_selected("api", &["web".into()]));
    }

    #[test]
    fn explicit_concurrency_wins_over_config() {
        struct NoResolver;
        impl Resolver for NoResolver {
            fn resolve(&self, _update_cache: bool) -> Result<DependencyGraph> {
                Ok(DependencyGraph::new(crate::dependency::ROOT_ID))
            }
        }

        let mut config = ConfigFile::empty();
        config.config.max_concurrency = 3;
        let manager = Manager::new(
            Arc::new(config),
            Arc::new(NoResolver),
            Arc::new(crate::exec::ShellBackend::new()),
        );
        assert_eq!(manager.concurrency(0), 3);
        assert_eq!(manager.concurrency(5), 5);
    }
}
