//! Tracing initialization (EnvFilter + fmt subscriber).
//!
//! Log verbosity is controlled via the standard `RUST_LOG` environment
//! variable, defaulting to `info` when unset.

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops (relevant for
/// tests where several entry points may try to initialize logging).
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
    {
        info!("Telemetry initialized");
    }

    Ok(())
}
