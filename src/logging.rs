use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "GRADING_LOG";
pub const LOG_FILE: &str = "canvas-grader.log";
const DEFAULT_FILTER: &str = "canvas_grader=info";

/// Routes tracing output to a daily file under `log_dir`; the terminal
/// belongs to the UI. Keep the guard alive until exit so buffered lines flush.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("Could not create log directory '{}': {err}", log_dir.display());
    }

    let file_appender = rolling::daily(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init();

    guard
}
