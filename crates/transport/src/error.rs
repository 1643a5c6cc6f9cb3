use framelink_protocol::FrameError;
use tokio_tungstenite::tungstenite;

/// Errors from transport carriers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The broker rejected the login token. Fatal: retrying with the
    /// same credentials cannot succeed.
    #[error("login rejected by {endpoint}: {reply}")]
    PermissionDenied { endpoint: String, reply: String },

    #[error("connection closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unexpected login reply {0:?}")]
    Handshake(String),

    #[error("no transport for endpoint {0:?}")]
    UnsupportedEndpoint(String),

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl TransportError {
    /// `true` when the error means bad credentials rather than a
    /// transient carrier fault.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::PermissionDenied { .. })
    }
}
