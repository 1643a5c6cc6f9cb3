use std::time::Duration;

use framelink_transport::MAX_FRAME_SIZE;

/// Runtime knobs, all with workable defaults.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Per-invocation handler deadline.
    pub handler_timeout: Duration,
    /// Cadence of the reconnect heartbeat.
    pub ensure_connection_interval: Duration,
    /// High-water mark for the outbound frame queue.
    pub send_queue_capacity: usize,
    /// Largest frame the agent advertises it accepts (`filter` command).
    pub max_frame_size: usize,
    /// Join `*` after connecting when no spaces have been joined.
    pub join_all: bool,
    /// Install interrupt/terminate/info signal handlers on start.
    pub install_signal_handlers: bool,
    /// mDNS service name used when no endpoint is configured.
    pub discovery_service: String,
    /// How long shutdown waits for cancelled tasks to finish.
    pub shutdown_grace: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(10),
            ensure_connection_interval: Duration::from_secs(5),
            send_queue_capacity: 1024,
            max_frame_size: MAX_FRAME_SIZE,
            join_all: false,
            install_signal_handlers: true,
            discovery_service: framelink_discovery::DEFAULT_SERVICE.to_owned(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Reads the default endpoint from `ENDPOINT`.
pub fn endpoint_from_env() -> Option<String> {
    std::env::var("ENDPOINT").ok().filter(|v| !v.is_empty())
}

/// Reads the agent token from `<AGENT>_TOKEN` (name uppercased,
/// dashes mapped to underscores).
pub fn token_from_env(agent_name: &str) -> Option<String> {
    let var = format!(
        "{}_TOKEN",
        agent_name.to_uppercase().replace('-', "_")
    );
    std::env::var(var).ok().filter(|v| !v.is_empty())
}
