//! Console and log-file output.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default log file, written next to wherever the tool is started.
pub const DEFAULT_LOG_FILE: &str = "marci_isis_processing.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: stdout plus, if given, an appended log file.
///
/// Call once at startup; a second call fails.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(env_filter()))
        .with(file_layer)
        .try_init()
        .context("Logging already initialized")?;

    Ok(())
}
