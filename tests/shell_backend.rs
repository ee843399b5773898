// tests/shell_backend.rs
#![cfg(unix)]

mod common;

use std::fs;
use std::process::Command;
use std::sync::Arc;

use clap::Parser;
use depdag::cli::CliArgs;
use depdag::config::load_and_validate;
use depdag::engine::{
    BuildOptions, CommandOptions, DeployOptions, PurgeOptions, RenderOptions, ShellHooks,
};
use depdag::errors::DepdagError;
use depdag::exec::ShellBackend;
use depdag_test_utils::{with_timeout, ConfigFileBuilder, RecordingHooks, Workspace};

use common::{manager, SharedBuffer};

fn shell_workspace() -> Workspace {
    let ws = Workspace::new();
    ws.project(
        "app",
        ConfigFileBuilder::new()
            .dependency("api", "../api")
            .hook(
                &["after:buildDependency"],
                "echo \"$DEPDAG_DEPENDENCY_NAME\" >> hooks.log",
            ),
    );
    ws.project(
        "api",
        ConfigFileBuilder::new()
            .dependency("db", "../db")
            .action("build", "echo api >> ../order.log && touch built")
            .action("deploy", "echo \"$DEPDAG_BUILT_IMAGES $DEPDAG_STAGE\" > deployed")
            .action("render", "echo \"name: $DEPDAG_DEPENDENCY\"")
            .action("purge", "rm -f built deployed")
            .image("api", "1.2.3")
            .command("touch", "touch"),
    );
    ws.project(
        "db",
        ConfigFileBuilder::new()
            .action("build", "echo db >> ../order.log && touch built")
            .action("render", "echo 'name: db'"),
    );
    ws
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn build_runs_actions_inside_dependency_directories() {
    let ws = shell_workspace();
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new()),
        &RecordingHooks::new(),
        false,
    );

    with_timeout(manager.build_all(BuildOptions::default()))
        .await
        .unwrap();

    assert!(ws.path().join("api/built").exists());
    assert!(ws.path().join("db/built").exists());
    let order = fs::read_to_string(ws.path().join("order.log")).unwrap();
    assert_eq!(order, "db\napi\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deploy_passes_built_images_and_purge_cleans_up() {
    let ws = shell_workspace();
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new().with_env("DEPDAG_STAGE", "test")),
        &RecordingHooks::new(),
        false,
    );

    with_timeout(manager.deploy_all(DeployOptions::default()))
        .await
        .unwrap();
    let deployed = fs::read_to_string(ws.path().join("api/deployed")).unwrap();
    assert_eq!(deployed.trim(), "api=1.2.3 test");

    with_timeout(manager.purge_all(PurgeOptions::default()))
        .await
        .unwrap();
    assert!(!ws.path().join("api/built").exists());
    assert!(!ws.path().join("api/deployed").exists());

    // Purging dropped the cached hash, so the next deploy acts again.
    with_timeout(manager.deploy_all(DeployOptions::default()))
        .await
        .unwrap();
    assert!(ws.path().join("api/deployed").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn render_captures_stdout_of_each_dependency() {
    let ws = shell_workspace();
    let buffer = SharedBuffer::default();
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new()),
        &RecordingHooks::new(),
        false,
    )
    .with_render_output(buffer.output());

    let options = RenderOptions {
        skip_build: true,
        ..RenderOptions::default()
    };
    with_timeout(manager.render_all(options)).await.unwrap();

    assert_eq!(buffer.contents(), "name: db\nname: api\n");
    assert!(!ws.path().join("api/built").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_action_reports_exit_code_and_output() {
    let ws = Workspace::new();
    ws.project("app", ConfigFileBuilder::new().dependency("api", "../api"));
    ws.project(
        "api",
        ConfigFileBuilder::new().action("build", "echo compiling; echo broken >&2; exit 3"),
    );
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new()),
        &RecordingHooks::new(),
        false,
    );

    let err = with_timeout(manager.build_all(BuildOptions::default()))
        .await
        .unwrap_err();

    let DepdagError::Action { log, source, .. } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(log.contains("compiling"), "log: {log}");
    assert!(log.contains("broken"), "log: {log}");
    assert!(matches!(*source, DepdagError::CommandFailed { code: 3, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_command_appends_quoted_arguments() {
    let ws = shell_workspace();
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new()),
        &RecordingHooks::new(),
        false,
    );

    let options = CommandOptions {
        dependency: "api".into(),
        command: "touch".into(),
        args: vec!["hello world".into()],
        ..CommandOptions::default()
    };
    with_timeout(manager.command(options)).await.unwrap();
    assert!(ws.path().join("api/hello world").exists());

    let unknown = CommandOptions {
        dependency: "db".into(),
        command: "touch".into(),
        ..CommandOptions::default()
    };
    let err = with_timeout(manager.command(unknown)).await.unwrap_err();
    let DepdagError::Action { source, .. } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(
        source.to_string().contains("couldn't find command 'touch'"),
        "{source}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_hooks_run_in_the_project_directory() {
    let ws = shell_workspace();
    let root_dir = ws.path().join("app");
    let config = load_and_validate(ws.config_path("app")).unwrap();
    let hooks = ShellHooks::new(config.hooks.clone(), &root_dir);
    let manager = manager(
        &ws,
        "app",
        Arc::new(ShellBackend::new()),
        &RecordingHooks::new(),
        false,
    )
    .with_hooks(Arc::new(hooks));

    with_timeout(manager.build_all(BuildOptions::default()))
        .await
        .unwrap();

    let log = fs::read_to_string(root_dir.join("hooks.log")).unwrap();
    assert_eq!(log, "db\napi\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_entry_point_builds_from_config_path() {
    let ws = shell_workspace();
    let config = ws.config_path("app");
    let args = CliArgs::parse_from([
        "depdag",
        "--config",
        config.to_str().unwrap(),
        "build",
        "--skip-dependency",
        "db",
    ]);

    with_timeout(depdag::run(args)).await.unwrap();

    assert!(ws.path().join("api/built").exists());
    assert!(!ws.path().join("db/built").exists());
}

#[test]
fn run_exits_with_the_command_exit_code() {
    let ws = Workspace::new();
    ws.project("app", ConfigFileBuilder::new().dependency("api", "../api"));
    ws.project(
        "api",
        ConfigFileBuilder::new()
            .command("fail", "exit 7")
            .action("build", "exit 5"),
    );
    let config = ws.config_path("app");

    let run = Command::new(env!("CARGO_BIN_EXE_depdag"))
        .args(["--config", config.to_str().unwrap(), "run", "api", "fail"])
        .output()
        .unwrap();
    assert_eq!(run.status.code(), Some(7));
    assert!(String::from_utf8_lossy(&run.stderr).contains("exited with code 7"));

    // Other verbs keep the generic failure code.
    let build = Command::new(env!("CARGO_BIN_EXE_depdag"))
        .args(["--config", config.to_str().unwrap(), "build"])
        .output()
        .unwrap();
    assert_eq!(build.status.code(), Some(1));
}
