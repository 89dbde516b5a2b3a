//! Log output wiring for the daemon and the one-shot CLI.
//!
//! The `start` daemon is long-lived and unattended, so it writes
//! machine-readable JSON to a daily-rotated file (scheduler tick summaries,
//! per-message lifecycle transitions) and mirrors human-readable lines to
//! stderr. One-shot subcommands print their results on stdout, so their
//! stderr stays quiet unless `RUST_LOG` asks for more.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Rotated file name prefix; the appender adds the date suffix.
const LOG_FILE_PREFIX: &str = "smsrelay.log";

const DAEMON_DEFAULT_DIRECTIVE: &str = "info";
const CLI_DEFAULT_DIRECTIVE: &str = "warn";

/// Keeps the background log writer alive.
///
/// The daemon holds this until exit; dropping it flushes whatever the
/// non-blocking writer has buffered and closes the log file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Set up daemon logging: JSON file layer plus a stderr layer.
///
/// Log files land in `logs_dir` as `smsrelay.log.YYYY-MM-DD`, one per day.
/// Both layers share one `RUST_LOG` filter, defaulting to `info`.
///
/// # Errors
///
/// Returns an error if `logs_dir` cannot be created.
pub fn init_daemon(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter_or(DAEMON_DEFAULT_DIRECTIVE))
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Set up logging for one-shot subcommands: stderr only, default `warn` so
/// command output on stdout stays scriptable.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(filter_or(CLI_DEFAULT_DIRECTIVE))
        .with_writer(std::io::stderr)
        .init();
}
