use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Maps the `-v` count to a default filter directive.
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,chainctl_app=info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initializes logging with a daily-rotated file under `logs_dir` plus a
/// compact stderr layer.
///
/// `filter` (from `CHAINCTL_LOG`) wins over the verbosity level. Returns a
/// guard that must be kept alive for the duration of the command.
pub fn init_logging(logs_dir: &Path, verbosity: u8, filter: Option<&str>) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    // File appender: daily rotation
    let file_appender = tracing_appender::rolling::daily(logs_dir, "chainctl");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directive = filter.unwrap_or_else(|| verbosity_filter(verbosity));
    let env_filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}
