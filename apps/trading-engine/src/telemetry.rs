//! Tracing setup.
//!
//! Console logging with `EnvFilter`; control verbosity with `RUST_LOG`
//! (default `info`).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests can all
/// attempt initialization.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
