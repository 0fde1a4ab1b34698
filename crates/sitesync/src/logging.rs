//! Tracing setup for applications embedding the client.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when `RUST_LOG` is unset or invalid.
///
/// `default_filter` takes the usual directive syntax, e.g. `"info"` or
/// `"sitesync_client=debug,warn"`. Calling this more than once, or after
/// another subscriber was installed, does nothing.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init so tests and embedders can call this repeatedly.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
