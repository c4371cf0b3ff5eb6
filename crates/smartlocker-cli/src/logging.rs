//! Tracing subscriber set-up for the kiosk binary.
//!
//! `RUST_LOG` wins over the configured level when set. Logs go to stderr so
//! they do not interleave with console output.

use smartlocker_kiosk::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the level is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init_logging(format: LogFormat, level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()?,
    }
    Ok(())
}
