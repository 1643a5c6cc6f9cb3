use std::time::Duration;

use framelink_discovery::DiscoveryError;
use framelink_protocol::{FrameError, Kind};
use framelink_transport::TransportError;

use crate::agent::AgentState;
use crate::handler::HandlerError;

/// Errors surfaced by the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler already set for {kind} {name:?}")]
    DuplicateHandler { kind: Kind, name: String },

    #[error("interval handler already set for {0:?}")]
    DuplicateInterval(String),

    #[error("handler for {kind} {name:?} exceeded rate limit {limit}")]
    RateLimited {
        kind: Kind,
        name: String,
        limit: crate::rate_limit::RateLimit,
    },

    #[error("handler for {kind} {name:?} timed out after {timeout:?}")]
    HandlerTimeout {
        kind: Kind,
        name: String,
        timeout: Duration,
    },

    #[error("request {name:?} timed out after {timeout:?}")]
    RequestTimeout { name: String, timeout: Duration },

    #[error("send queue is full ({capacity} frames)")]
    QueueFull { capacity: usize },

    #[error("task {0:?} is already running")]
    TaskAlreadyRunning(String),

    #[error("invalid rate limit {0:?}, expected calls/period like 10/m")]
    InvalidRateLimit(String),

    #[error("agent is not connected")]
    NotConnected,

    #[error("agent is stopping")]
    Stopped,

    #[error("agent cannot start from state {0:?}")]
    InvalidState(AgentState),

    #[error("handler {name:?} failed: {reason}")]
    Handler { name: String, reason: HandlerError },
}
