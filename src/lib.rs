// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod dependency;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::cache::open_store;
use crate::cli::{BuildArgs, CliArgs, CliCommand, SelectionArgs};
use crate::config::load_and_validate;
use crate::dependency::{ConfigResolver, Dependency};
use crate::engine::{
    BuildOptions, CommandOptions, DependencyOptions, DeployOptions, Manager, PurgeOptions,
    RenderOptions, ResolveOptions, ShellHooks,
};
use crate::errors::DepdagError;
use crate::exec::ShellBackend;
use crate::fs::{FileSystem, RealFileSystem};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - dependency resolution and the hash cache
/// - the shell action backend and `[[hook]]` dispatch
/// - the verb selected on the command line
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let config = Arc::new(load_and_validate(&config_path)?);
    let root_dir = config_root_dir(&config_path);
    debug!(root = ?root_dir, dependencies = config.dependency.len(), "loaded config");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let cache = open_store(config.config.hash_storage_mode, &root_dir, Arc::clone(&fs));
    let resolver = ConfigResolver::new(&root_dir, Arc::clone(&config), fs, cache)
        .allow_cyclic(args.allow_cyclic);
    let hooks = ShellHooks::new(config.hooks.clone(), &root_dir);

    let manager = Manager::new(config, Arc::new(resolver), Arc::new(ShellBackend::new()))
        .with_hooks(Arc::new(hooks));

    match args.command {
        CliCommand::Update => manager.update_all().await?,
        CliCommand::Build(build) => {
            manager.build_all(build_options(build)).await?;
        }
        CliCommand::Deploy(deploy) => {
            let build = build_options(deploy.build);
            let options = DeployOptions {
                dependencies: build.dependencies,
                force_dependencies: build.force_dependencies,
                max_concurrency: build.max_concurrency,
                skip_build: deploy.skip_build,
                skip_deploy: deploy.skip_deploy,
                force_deploy: deploy.force_deploy,
            };
            manager.deploy_all(options).await?;
        }
        CliCommand::Purge(selection) => {
            let options = PurgeOptions {
                skip_dependencies: selection.skip_dependencies,
                dependencies: selection.dependencies,
                verbose: selection.verbose_dependencies,
            };
            manager.purge_all(options).await?;
        }
        CliCommand::Render(render) => {
            let options = RenderOptions {
                dependencies: dependency_options(render.selection),
                skip_build: render.skip_build,
            };
            manager.render_all(options).await?;
        }
        CliCommand::Resolve(selection) => {
            let options = ResolveOptions {
                dependencies: dependency_options(selection),
                silent: false,
            };
            let roots = manager.resolve_all(options).await?;
            print_tree(&roots);
        }
        CliCommand::Run(run) => {
            let options = CommandOptions {
                dependency: run.dependency,
                command: run.command,
                args: run.args,
                update_dependencies: run.update_dependencies,
                verbose: run.verbose_dependencies,
            };
            manager.command(options).await?;
        }
    }

    Ok(())
}

/// Process exit code for a failed invocation.
///
/// `run` passes the dependency command's own non-zero exit code through;
/// everything else exits with 1.
pub fn exit_code(command: &CliCommand, err: &anyhow::Error) -> i32 {
    if !matches!(command, CliCommand::Run(_)) {
        return 1;
    }
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DepdagError>())
        .find_map(DepdagError::command_exit_code)
        .filter(|code| *code > 0)
        .unwrap_or(1)
}

fn dependency_options(selection: SelectionArgs) -> DependencyOptions {
    DependencyOptions {
        skip_dependencies: selection.skip_dependencies,
        dependencies: selection.dependencies,
        update_dependencies: selection.update_dependencies,
        verbose: selection.verbose_dependencies,
    }
}

fn build_options(build: BuildArgs) -> BuildOptions {
    BuildOptions {
        dependencies: dependency_options(build.selection),
        force_dependencies: build.force_dependencies,
        max_concurrency: build.max_concurrent_builds,
    }
}

/// Figure out the project root.
///
/// - If the config path has a non-empty parent (e.g. "infra/Depdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Depdag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print resolved root dependencies and their sub-dependencies.
fn print_tree(roots: &[Arc<Dependency>]) {
    fn print_node(dependency: &Dependency, depth: usize) {
        println!(
            "{}{} ({})",
            "  ".repeat(depth),
            dependency.name(),
            dependency.local_path().display()
        );
        for child in dependency.children() {
            print_node(&child, depth + 1);
        }
    }

    for root in roots {
        print_node(root, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_command() -> CliCommand {
        CliCommand::Run(crate::cli::RunArgs {
            dependency: "api".into(),
            command: "fail".into(),
            args: Vec::new(),
            update_dependencies: false,
            verbose_dependencies: false,
        })
    }

    fn failed_command(code: i32) -> anyhow::Error {
        DepdagError::Action {
            action: "Command".into(),
            dependency: "api".into(),
            log: String::new(),
            source: Box::new(DepdagError::CommandFailed {
                command: "fail".into(),
                code,
            }),
        }
        .into()
    }

    #[test]
    fn run_passes_command_exit_code_through() {
        assert_eq!(exit_code(&run_command(), &failed_command(7)), 7);
        assert_eq!(exit_code(&run_command(), &failed_command(-1)), 1);
        assert_eq!(exit_code(&CliCommand::Update, &failed_command(7)), 1);

        let other = anyhow::Error::from(DepdagError::DependencyNotFound("api".into()));
        assert_eq!(exit_code(&run_command(), &other), 1);
    }

    #[test]
    fn bare_config_name_uses_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config_root_dir(Path::new("Depdag.toml")), cwd);
        assert_eq!(
            config_root_dir(Path::new("infra/Depdag.toml")),
            PathBuf::from("infra")
        );
    }
}
