//! Tracing integration for structured logging.
//!
//! Installs a `tracing-subscriber` registry with a verbosity-derived filter
//! that `RUST_LOG` can override, writing text or JSON to stderr or a file.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a `-v` count to a level name (0=error, 1=warn, 2=info, 3=debug, 4+=trace).
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Build the default filter directive for the rcmd crates.
fn default_directive(verbosity: u8) -> String {
    let level = level_for_verbosity(verbosity);
    format!("rcmd={level},rcmd_core={level},rcmd_client={level}")
}

/// Initialize the logging system.
///
/// Fails if a global subscriber is already installed or the log file cannot
/// be opened.
///
/// ```ignore
/// use rcmd_core::logging::{init_logging, LogFormat};
///
/// init_logging(2, None, LogFormat::Text)?;
/// ```
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let detailed = verbosity >= 3;

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (log_file, format) {
        (None, LogFormat::Text) => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(detailed)
                    .with_line_number(detailed),
            )
            .try_init(),
        (None, LogFormat::Json) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (Some(path), LogFormat::Text) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(detailed)
                        .with_line_number(detailed),
                )
                .try_init()
        }
        (Some(path), LogFormat::Json) => {
            let file = open_log_file(path)?;
            registry
                .with(fmt::layer().json().with_writer(file))
                .try_init()
        }
    };

    installed.map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

/// Initialize logging with defaults for testing.
///
/// Ignores the error when a subscriber is already installed.
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}
