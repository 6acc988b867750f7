//! Structured logging setup.
//!
//! Call [`init`] once at process startup (both `src/bin` entrypoints do
//! this). Library code never installs a subscriber itself - it only emits
//! `tracing` events, leaving sink configuration to the caller.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` fmt layer honoring `RUST_LOG`, defaulting
/// to `info` for this crate and `warn` for dependencies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,specsmith=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
