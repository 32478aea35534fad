use std::io;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

const LOG_FILE_PREFIX: &str = "archiver.log";
const FALLBACK_LEVEL: &str = "info";

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Console plus daily-rolling file output. Calling it twice is a no-op.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.logging.level),
    };

    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::daily(&paths.logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout).with_target(true))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    let _ = FILE_GUARD.set(guard);

    tracing::info!(
        target: "lifecycle",
        logs = %paths.logs_dir.display(),
        level = %config.logging.level,
        "logging to console and {LOG_FILE_PREFIX}"
    );
    Ok(())
}

/// Parses `LOG_LEVEL`-style directives, falling back to `info` when malformed.
fn level_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_target_directives_are_kept() {
        let filter = level_filter("channel_archiver=debug,info").to_string();
        assert!(filter.contains("channel_archiver=debug"));
        assert!(filter.contains("info"));
    }

    #[test]
    fn malformed_level_falls_back_to_info() {
        assert_eq!(level_filter("archiver=loud").to_string(), FALLBACK_LEVEL);
    }
}
