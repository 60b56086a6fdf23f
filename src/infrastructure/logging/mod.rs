// Logging module - Logging infrastructure
use crate::domain::error::{BusProbeError, BusProbeResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging system.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this crate and
/// everything else logs warnings only. Logs go to stderr so console results
/// on stdout stay clean.
pub fn init_logging(level: &str, verbose: bool) -> BusProbeResult<()> {
    let level = if verbose { "debug" } else { normalize_level(level) };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("busprobe={},warn", level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| BusProbeError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("BusProbe logging system initialized");
    Ok(())
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}
