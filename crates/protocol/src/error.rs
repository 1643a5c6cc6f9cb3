use crate::kind::Kind;

/// Errors from frame construction and the wire codecs.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame name must not be blank")]
    BlankName,

    #[error("frame name must be 2..=128 bytes, got {len}")]
    NameLength { len: usize },

    #[error("unknown frame kind {0}")]
    UnknownKind(u16),

    #[error("frame uuid must be 32 hex characters")]
    InvalidUuid,

    #[error("frame {field} must be a JSON object")]
    NotAnObject { field: &'static str },

    #[error("frame {field} is {size} bytes serialized, max {max}")]
    TooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("binary frame length mismatch: header says {expected} bytes, buffer has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("frame field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Errors from the protocol state machine.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("must send login before exchanging frames")]
    AuthRequired,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("expected login command, got {kind:?} {name:?}")]
    ExpectedLogin { kind: Kind, name: String },

    #[error("login frame is missing a token")]
    MissingToken,

    #[error("payload does not match the negotiated wire format")]
    WrongWireFormat,
}
