//! Agent runtime for framelink.
//!
//! An [`Agent`] registers handlers for named frames, connects to a
//! broker over any [`Transport`](framelink_transport::Transport), and
//! keeps running through connection churn: a 5-second heartbeat
//! redials, re-advertises the handler filter, and re-joins spaces
//! after every drop. Without an endpoint or token the same agent runs
//! standalone, dispatching its own frames to its own handlers.
//!
//! ```no_run
//! use std::time::Duration;
//! use framelink_runtime::{Agent, Handler};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), framelink_runtime::AgentError> {
//! let agent = Agent::new("hello-agent");
//! agent.on_event("hello", Handler::new(|frame| async move {
//!     println!("hello, {}", frame.data()["name"]);
//!     Ok(None)
//! }))?;
//! agent.on_request("whoami", Handler::nullary(|| async {
//!     Ok(Some(json!({ "name": "hello-agent" })))
//! }))?;
//! agent.on_interval("poll", Duration::from_secs(30), Handler::nullary(|| async {
//!     Ok(None)
//! }))?;
//! agent.run("ws://localhost:26514/", "agent-token").await
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod logging;
pub mod rate_limit;

pub(crate) mod dispatch;
pub(crate) mod registry;
pub(crate) mod scheduler;
pub(crate) mod send_queue;
pub(crate) mod signals;
pub(crate) mod spaces;
pub(crate) mod supervisor;

pub use agent::{Agent, AgentState};
pub use config::{AgentConfig, endpoint_from_env, token_from_env};
pub use connection::{TransportFactory, default_transport_factory};
pub use error::AgentError;
pub use handler::{Handler, HandlerError, HandlerResult};
pub use rate_limit::RateLimit;

// Re-exported so applications depend on one crate.
pub use framelink_protocol::{Frame, FrameError, Kind};
pub use framelink_transport::{QueuePeer, QueueTransport, Transport, TransportError};
