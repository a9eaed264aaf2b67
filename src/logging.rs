//! Tracing setup for the two binaries.
//!
//! The GUI process logs to a daily rolling file (and optionally the console)
//! through a non-blocking writer; the worker logs synchronously to stderr so
//! its stdout stays clean for the outcome stream.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Level filter from the preferences debug flag.
fn level_filter(debug_mode: bool) -> EnvFilter {
    if debug_mode {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Install the GUI process subscriber.
///
/// Records land in `<log_dir>/<log_prefix>.<date>.log` with daily rotation;
/// `console_output` adds a colored console layer on top. Returns the flush
/// guard for the non-blocking file writer, which the caller must hold until
/// the process exits or buffered records are lost.
pub fn setup_logging_with_console(
    log_dir: &str,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    let log_path = Utf8PathBuf::from(log_dir);
    fs::create_dir_all(&log_path)
        .with_context(|| format!("Failed to create log directory: {log_path}"))?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, log_prefix));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let registry = tracing_subscriber::registry()
        .with(level_filter(debug_mode))
        .with(file_layer);
    if console_output {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false))
            .init();
    } else {
        registry.init();
    }

    tracing::info!(
        dir = log_dir,
        prefix = log_prefix,
        debug = debug_mode,
        console = console_output,
        "Logging initialized"
    );

    Ok(guard)
}

/// Install the worker process subscriber.
///
/// Worker stdout is reserved for the outcome stream read by the coordinator,
/// so everything goes to stderr. The writer is synchronous: a worker may exit
/// within milliseconds of its last record, before a background flush thread
/// would get to it.
pub fn setup_worker_logging(debug_mode: bool) {
    tracing_subscriber::registry()
        .with(level_filter(debug_mode))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true),
        )
        .init();
}
