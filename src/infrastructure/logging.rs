//! Centralized file-based logging system
//!
//! Writes logs to files under the configured log directory, separated by
//! log type:
//! - <dir>/main - All application logs (JSON)
//! - <dir>/error - Error and warning logs only
//! - <dir>/path - Path threads, fan-out and overruns
//! - <dir>/node - Node lifecycle and I/O errors
//! - <dir>/stats - Periodic rows of the stats hook

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Per-type subdirectories, also used as file name prefixes
const LOG_TYPES: [&str; 5] = ["main", "error", "path", "node", "stats"];

/// Initialize centralized file logging
///
/// Creates the log directory and sets up file appenders for the different
/// log types. `RUST_LOG` overrides `level`. Returns the appender guards,
/// which must be kept alive for the duration of the program.
pub fn init_logging(dir: &Path, level: &str) -> io::Result<Vec<WorkerGuard>> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(dir.join(log_type))?;
    }

    let mut guards = Vec::new();

    let (main_appender, main_guard) = create_appender(dir, "main");
    guards.push(main_guard);

    let (error_appender, error_guard) = create_appender(dir, "error");
    guards.push(error_guard);

    let (path_appender, path_guard) = create_appender(dir, "path");
    guards.push(path_guard);

    let (node_appender, node_guard) = create_appender(dir, "node");
    guards.push(node_guard);

    let (stats_appender, stats_guard) = create_appender(dir, "stats");
    guards.push(stats_guard);

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let path_layer = tracing_subscriber::fmt::layer()
        .with_writer(path_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "path" || metadata.target() == "hook"
        }));

    let node_layer = tracing_subscriber::fmt::layer()
        .with_writer(node_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "node"
        }));

    let stats_layer = tracing_subscriber::fmt::layer()
        .with_writer(stats_appender)
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "stats"
        }));

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(path_layer)
        .with(node_layer)
        .with(stats_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

    tracing::info!("Logging system initialized. Log files in {}", dir.display());

    Ok(guards)
}

/// Create a daily rolling file appender in `<dir>/<name>`
fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir.join(name), name);

    tracing_appender::non_blocking(appender)
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_path {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "path", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_node {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "node", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_hook {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "hook", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_engine {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "engine", $level, $($arg)+)
    };
}
