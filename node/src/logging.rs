//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Output always goes to stderr
//! so stdout stays clean for `keygen`, `digest`, and `sign`, whose output
//! is meant to be piped.
//!
//! The contract crates log committed transitions at `info`, rejected calls
//! at `debug` (with the numeric error code), and deployer overrides at
//! `warn`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str =
    "warden_node=info,warden_contracts=info,warden_protocol=info,tower_http=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored. Local development.
    Pretty,
    /// One line per event.
    Compact,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Case-insensitive; anything unrecognized falls back to `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// `RUST_LOG` when it parses, otherwise `directives`.
pub fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Installs the global subscriber. Fails if one is already installed.
///
/// ```text
/// RUST_LOG=warden_contracts=debug warden-node run
/// ```
pub fn init_logging(directives: &str, format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(directives));

    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
