use crate::error::FrameError;

/// The purpose of a frame.
///
/// `Command` through `Response` are the dispatchable kinds an agent can
/// register handlers for. `State` and `Stream` are reserved for bulk
/// payloads on the binary codec and never reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Kind {
    Command = 1,
    Event = 2,
    Message = 3,
    Request = 4,
    Response = 5,
    State = 6,
    Stream = 7,
}

impl Kind {
    /// Kinds an agent may register handlers for.
    pub const DISPATCHABLE: [Kind; 5] = [
        Kind::Command,
        Kind::Event,
        Kind::Message,
        Kind::Request,
        Kind::Response,
    ];

    /// Lowercase label used in logs and the `filter` command.
    pub fn label(self) -> &'static str {
        match self {
            Kind::Command => "command",
            Kind::Event => "event",
            Kind::Message => "message",
            Kind::Request => "request",
            Kind::Response => "response",
            Kind::State => "state",
            Kind::Stream => "stream",
        }
    }
}

impl TryFrom<u16> for Kind {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Kind::Command),
            2 => Ok(Kind::Event),
            3 => Ok(Kind::Message),
            4 => Ok(Kind::Request),
            5 => Ok(Kind::Response),
            6 => Ok(Kind::State),
            7 => Ok(Kind::Stream),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
