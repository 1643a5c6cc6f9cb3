//! Carrier transports for framelink agents.
//!
//! A [`Transport`] delivers whole frames to and from a broker. The
//! carrier is chosen by endpoint prefix: `ws://`/`wss://` (WebSocket
//! text JSON), `dgram://host:port/` (UDP datagrams), `queue://`
//! (in-memory, for tests and standalone wiring). Construction performs
//! the login handshake, so a `Transport` in hand is authenticated.

pub mod datagram;
pub mod error;
pub mod queue;
pub mod websocket;

use framelink_protocol::{Frame, FrameError};
use serde_json::json;

pub use datagram::DatagramTransport;
pub use error::TransportError;
pub use queue::{QueuePeer, QueueTransport};
pub use websocket::WebSocketTransport;

/// Largest frame any carrier will accept, in bytes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A connected, authenticated carrier.
#[derive(Debug)]
pub enum Transport {
    WebSocket(WebSocketTransport),
    Datagram(DatagramTransport),
    Queue(QueueTransport),
}

impl Transport {
    /// Connects to `endpoint`, choosing the carrier by prefix, and
    /// completes the login handshake with `token`.
    pub async fn connect(endpoint: &str, token: &str) -> Result<Self, TransportError> {
        if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            Ok(Self::WebSocket(
                WebSocketTransport::connect(endpoint, token).await?,
            ))
        } else if endpoint.starts_with("dgram://") {
            Ok(Self::Datagram(
                DatagramTransport::connect(endpoint, token).await?,
            ))
        } else if endpoint.starts_with("queue://") {
            Ok(Self::Queue(QueueTransport::loopback(endpoint, token).await?))
        } else {
            Err(TransportError::UnsupportedEndpoint(endpoint.to_owned()))
        }
    }

    /// Wraps an already-paired queue transport, completing the login
    /// handshake against its peer.
    pub async fn from_queue(queue: QueueTransport, token: &str) -> Result<Self, TransportError> {
        queue.login(token).await?;
        Ok(Self::Queue(queue))
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        match self {
            Self::WebSocket(t) => t.send(frame).await,
            Self::Datagram(t) => t.send(frame).await,
            Self::Queue(t) => t.send(frame).await,
        }
    }

    pub async fn recv(&self) -> Result<Frame, TransportError> {
        match self {
            Self::WebSocket(t) => t.recv().await,
            Self::Datagram(t) => t.recv().await,
            Self::Queue(t) => t.recv().await,
        }
    }

    pub async fn close(&self) {
        match self {
            Self::WebSocket(t) => t.close().await,
            Self::Datagram(t) => t.close(),
            Self::Queue(t) => t.close(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::WebSocket(t) => t.is_connected(),
            Self::Datagram(t) => t.is_connected(),
            Self::Queue(t) => t.is_connected(),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::WebSocket(t) => t.endpoint(),
            Self::Datagram(t) => t.endpoint(),
            Self::Queue(t) => t.endpoint(),
        }
    }
}

/// Builds the `login` command sent first on every carrier.
pub(crate) fn login_frame(token: &str) -> Result<Frame, FrameError> {
    Frame::command("login")?.with_data(json!({ "token": token }))
}

/// Checks the broker's reply to `login`.
pub(crate) fn check_login_reply(endpoint: &str, reply: &Frame) -> Result<(), TransportError> {
    match reply.name() {
        "login-ok" => Ok(()),
        "login-fail" | "login-failed" => Err(TransportError::PermissionDenied {
            endpoint: endpoint.to_owned(),
            reply: reply.name().to_owned(),
        }),
        other => Err(TransportError::Handshake(other.to_owned())),
    }
}
