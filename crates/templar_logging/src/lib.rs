//! Shared tracing setup for Templar test binaries.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "templar=info";

static TEST_LOGGING: Once = Once::new();

/// Logging configuration for binaries driving isolated-database tests.
#[derive(Debug, Clone, Default)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Log everything the filter allows to stderr; otherwise stderr only gets warnings.
    pub verbose: bool,
    /// Also append plain-text logs to `<log_dir>/<app_name>.log`.
    pub log_dir: Option<PathBuf>,
}

/// Install a test-writer subscriber once per process.
///
/// Honors `RUST_LOG`, falling back to `templar=info`. Safe to call from every
/// test; later calls are no-ops.
pub fn init_test_logging() {
    TEST_LOGGING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        // Another subscriber may already be installed by the harness
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Initialize tracing with stderr output and an optional log file.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    let file_layer = match &config.log_dir {
        Some(dir) => {
            let path = log_file_path(dir, config.app_name);
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

/// Path of the log file for `app_name` inside `dir`.
pub fn log_file_path(dir: &std::path::Path, app_name: &str) -> PathBuf {
    dir.join(format!("{}.log", sanitize_name(app_name)))
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "templar".to_string()
    } else {
        cleaned
    }
}
