// src/engine/options.rs

/// Which dependencies an orchestration call acts on, and how it reports.
#[derive(Debug, Clone, Default)]
pub struct DependencyOptions {
    /// Names that are walked but not acted upon.
    pub skip_dependencies: Vec<String>,
    /// Names to act upon; empty means all.
    pub dependencies: Vec<String>,
    /// Refresh the dependency cache while resolving.
    pub update_dependencies: bool,
    /// Forward dependency output to the log as it happens.
    pub verbose: bool,
}

/// Options shared by every `handle_dependencies` call.
#[derive(Debug, Clone, Default)]
pub struct HandleOptions {
    pub dependencies: DependencyOptions,
    /// Suppress progress messages.
    pub silent: bool,
    /// Worker count; `0` means available processing units.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub dependencies: DependencyOptions,
    pub silent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub dependencies: DependencyOptions,
    /// Rebuild even if the dependency directory is unchanged.
    pub force_dependencies: bool,
    /// `0` falls back to `[config] max_concurrency`.
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub dependencies: DependencyOptions,
    pub force_dependencies: bool,
    pub max_concurrency: usize,
    pub skip_build: bool,
    pub skip_deploy: bool,
    pub force_deploy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PurgeOptions {
    pub skip_dependencies: Vec<String>,
    pub dependencies: Vec<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub dependencies: DependencyOptions,
    pub skip_build: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub dependency: String,
    pub command: String,
    pub args: Vec<String>,
    pub update_dependencies: bool,
    pub verbose: bool,
}
