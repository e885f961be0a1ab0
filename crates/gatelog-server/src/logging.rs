//! Logging setup for the gate service.
//!
//! Two shapes, picked by `server.production`:
//! - **Production**: JSON to a daily rolling file in `server.log_dir`, plus
//!   compact stdout for the journal
//! - **Development**: pretty stdout with span open/close events
//!
//! Filter directives are taken from `RUST_LOG`, then `GATELOG_LOG_LEVEL`,
//! then `server.log_filter`. The default filter keeps per-frame decoding
//! quiet; `GATELOG_LOG_LEVEL=info,gatelog_core=trace` shows every frame.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use gatelog_core::ServerConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides `server.log_filter`.
pub const LOG_LEVEL_ENV: &str = "GATELOG_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "gatelog";
const LOG_FILE_SUFFIX: &str = "log";

// Dropping a guard stops its writer thread.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber described by `server`.
///
/// # Errors
///
/// Returns an error if the filter directives do not parse, or if the log
/// directory or rolling file cannot be created in production mode.
pub fn init(server: &ServerConfig) -> anyhow::Result<()> {
    let directives = filter_directives(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
        &server.log_filter,
    );
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter {directives:?}"))?;

    if server.production {
        init_production(filter, &log_directory(server), server.log_max_files)
    } else {
        init_development(filter);
        Ok(())
    }
}

/// First non-blank source wins: `RUST_LOG`, `GATELOG_LOG_LEVEL`, config.
fn filter_directives(
    rust_log: Option<String>,
    level_env: Option<String>,
    configured: &str,
) -> String {
    [rust_log, level_env]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

fn init_production(filter: EnvFilter, dir: &Path, max_files: usize) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(max_files)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("A global subscriber is already installed")?;

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    tracing::info!(dir = %dir.display(), max_files, "File logging enabled");
    Ok(())
}

fn init_development(filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

/// `server.log_dir`, or the platform default.
fn log_directory(server: &ServerConfig) -> PathBuf {
    server.log_dir.clone().unwrap_or_else(default_log_directory)
}

fn default_log_directory() -> PathBuf {
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/gatelog");
    }
    directories::ProjectDirs::from("", "", "gatelog")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}
