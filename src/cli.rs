// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `depdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "depdag",
    version,
    about = "Build, deploy, render and purge a tree of dependent projects in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Depdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Depdag.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEPDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Skip dependency edges that would form a cycle instead of failing.
    #[arg(long, global = true)]
    pub allow_cyclic: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Re-resolve all dependencies and refresh the dependency cache.
    Update,
    /// Build all dependencies.
    Build(BuildArgs),
    /// Build and deploy all dependencies.
    Deploy(DeployArgs),
    /// Purge all dependencies, dependents first.
    Purge(SelectionArgs),
    /// Render all dependencies to stdout.
    Render(RenderArgs),
    /// Resolve and print the dependency order without acting.
    Resolve(SelectionArgs),
    /// Run a named command of one dependency.
    Run(RunArgs),
}

/// Flags shared by every verb that walks the dependency graph.
#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Walk but do not act on this dependency (repeatable).
    #[arg(long = "skip-dependency", value_name = "NAME")]
    pub skip_dependencies: Vec<String>,

    /// Only act on this dependency (repeatable).
    #[arg(long = "dependency", value_name = "NAME")]
    pub dependencies: Vec<String>,

    /// Refresh the dependency cache before acting.
    #[arg(long)]
    pub update_dependencies: bool,

    /// Stream the output of every dependency instead of buffering it.
    #[arg(long)]
    pub verbose_dependencies: bool,
}

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Act on dependencies even if they are unchanged.
    #[arg(long)]
    pub force_dependencies: bool,

    /// Number of dependencies processed at once (0 = config / CPU count).
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_concurrent_builds: usize,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    #[arg(long)]
    pub skip_build: bool,

    #[arg(long)]
    pub skip_deploy: bool,

    /// Ask the backend to redeploy even if it considers the deployment current.
    #[arg(long)]
    pub force_deploy: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long)]
    pub skip_build: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Dependency whose command should run.
    pub dependency: String,

    /// Name of the command in the dependency's `[commands]` table.
    pub command: String,

    /// Extra arguments appended to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    #[arg(long)]
    pub update_dependencies: bool,

    #[arg(long)]
    pub verbose_dependencies: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_deploy_flags() {
        let args = CliArgs::try_parse_from([
            "depdag",
            "--allow-cyclic",
            "deploy",
            "--skip-dependency",
            "db",
            "--dependency",
            "api",
            "--dependency",
            "web",
            "--max-concurrent-builds",
            "4",
            "--skip-build",
        ])
        .unwrap();

        assert!(args.allow_cyclic);
        assert_eq!(args.config, "Depdag.toml");
        let CliCommand::Deploy(deploy) = args.command else {
            panic!("expected deploy");
        };
        assert_eq!(deploy.build.selection.skip_dependencies, vec!["db"]);
        assert_eq!(deploy.build.selection.dependencies, vec!["api", "web"]);
        assert_eq!(deploy.build.max_concurrent_builds, 4);
        assert!(deploy.skip_build);
        assert!(!deploy.skip_deploy);
    }

    #[test]
    fn run_keeps_trailing_arguments() {
        let args =
            CliArgs::try_parse_from(["depdag", "run", "api", "test", "--", "-v", "unit"]).unwrap();
        let CliCommand::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.dependency, "api");
        assert_eq!(run.command, "test");
        assert_eq!(run.args, vec!["-v", "unit"]);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
