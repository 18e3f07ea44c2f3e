//! Tracing setup.
//!
//! Logs go to stderr. With `debug_log` enabled they are also written to a
//! daily rotated file under the log directory.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DaemonConfig;

/// File name prefix of the debug log.
pub const LOG_FILE_PREFIX: &str = "obexgate.log";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(config: &DaemonConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file and must be held until exit.
pub fn init(config: &DaemonConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(config, verbose)))
        .context("Invalid log filter")?;

    if !config.debug_log {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init()
            .context("Failed to install log subscriber")?;
        return Ok(None);
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .with(filter)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(Some(guard))
}
