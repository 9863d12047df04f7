/// File logging shared with the other bar scripts.
///
/// Standard output carries the NDJSON records the bar reads, so logs go only
/// to `waybar.log`, one line per event:
///   `[2024-05-01 12:00:00]  INFO mediaplayer::supervisor: Starting main loop`
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `debug`).
pub const LOG_LEVEL_ENV: &str = "WAYBAR_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

/// Local wall-clock timestamps in `[YYYY-MM-DD HH:MM:SS]` form.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Installs the global subscriber, appending to `log_path`.
///
/// The returned guard flushes buffered lines when dropped; keep it alive
/// until the process exits.
pub fn init(log_path: &Path) -> Result<WorkerGuard> {
    let dir = log_path
        .parent()
        .context("Log path has no parent directory")?;
    let file_name = log_path
        .file_name()
        .context("Log path has no file name")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))?;

    Ok(guard)
}

pub fn log_script_start(args: &[String]) {
    tracing::info!("=== mediaplayer v{} started ===", env!("CARGO_PKG_VERSION"));
    tracing::info!("Arguments: {args:?}");
}

pub fn log_script_end() {
    tracing::info!("=== mediaplayer finished ===");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_writes_bracketed_local_time() {
        let mut out = String::new();
        LocalTimer.format_time(&mut Writer::new(&mut out)).unwrap();
        // "[YYYY-MM-DD HH:MM:SS]"
        assert_eq!(out.len(), 21);
        assert!(out.starts_with('[') && out.ends_with(']'));
        assert_eq!(&out[5..6], "-");
        assert_eq!(&out[11..12], " ");
        assert_eq!(&out[14..15], ":");
    }
}
