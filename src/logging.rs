// src/logging.rs

//! Logging setup for `depdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DEPDAG_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only rendered manifests
//! and the output of `depdag run`.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is not given.
///
/// Accepts a plain level (`debug`) or a full filter directive
/// (`depdag=debug,warn`).
pub const LOG_ENV_VAR: &str = "DEPDAG_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_from_log_level(lvl).to_string()),
        None => match std::env::var(LOG_ENV_VAR) {
            Ok(directive) => filter_from_env(&directive)?,
            Err(_) => EnvFilter::new(tracing::Level::INFO.to_string()),
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing log subscriber: {err}"))?;

    Ok(())
}

fn filter_from_env(directive: &str) -> Result<EnvFilter> {
    if let Some(level) = parse_level_str(directive) {
        return Ok(EnvFilter::new(level.to_string()));
    }
    EnvFilter::try_new(directive).with_context(|| format!("invalid {LOG_ENV_VAR} value '{directive}'"))
}

pub(crate) fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub(crate) fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
