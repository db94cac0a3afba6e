//! Logging initialization.
//!
//! The configured level applies to this crate's own events; other crates log
//! at `warn`. A RUST_LOG environment variable replaces the whole filter.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a configured level.
pub fn filter_directive(level: &str) -> String {
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level.to_ascii_lowercase())
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        // one object per event, span context lives in the fields
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_thread_names(true))
            .try_init(),
    }
}
