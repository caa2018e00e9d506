//! Tracing configuration and log routing.
//!
//! The server logs compactly to stdout and appends the same events to a log file
//! (`TOPICAL_LOG_FILE`, else `logs/topical.log`). The command-line tool logs to stderr only,
//! so stdout carries nothing but summaries. Chunk-level progress is logged at `info`, retry
//! and throttle waits at `warn`/`debug`, so long documents stay traceable without `RUST_LOG`.
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILE: &str = "logs/topical.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the server subscriber: stdout plus a non-blocking file layer when the log file
/// can be opened. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let log_path = log_file_path(std::env::var("TOPICAL_LOG_FILE").ok());
    let file_layer = open_log_writer(&log_path).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();
    tracing::debug!(path = %log_path.display(), "Tracing initialized");
}

/// Install the command-line subscriber: stderr only, `warn` unless `RUST_LOG` says otherwise.
pub fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log file to append to: the override when it is non-blank, else the default location.
fn log_file_path(override_path: Option<String>) -> PathBuf {
    override_path
        .filter(|path| !path.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from)
}

/// Open `path` for appending, creating its directory, and wrap it in a non-blocking writer
/// whose guard lives for the rest of the process.
fn open_log_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {err}", dir.display());
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
