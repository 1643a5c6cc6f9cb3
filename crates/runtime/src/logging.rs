//! Process-level log setup for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber.
///
/// `FRAMELINK_LOG` overrides `default_filter` (standard env-filter
/// syntax). Safe to call more than once; later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_env("FRAMELINK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
