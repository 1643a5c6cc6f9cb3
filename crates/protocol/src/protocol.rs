//! Login-first protocol state machine.
//!
//! Both peers start unauthenticated. The client sends a `login`
//! COMMAND carrying its token; the server answers `login-ok` (or
//! `login-fail`). After that, any frame is legal in either direction.
//! [`Protocol::decode`] classifies inbound payloads into [`Action`]s
//! and enforces the ordering; it is transport-agnostic and works over
//! either wire format.

use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::kind::Kind;

/// Encoding used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Binary,
}

/// An encoded frame ready for (or fresh off) the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// What the peer should do with a parsed payload.
#[derive(Debug)]
pub enum Action {
    /// Server side: the first `login` arrived; credentials extracted.
    RecvAuth {
        frame: Frame,
        agent_uuid: Option<String>,
        token: String,
    },
    /// Client side: the server acknowledged the login.
    AckAuth(Frame),
    /// A reply that must be written back (e.g. `pong` for `ping`).
    SendFrame(Frame),
    /// An application frame for the dispatcher.
    RecvFrame(Frame),
}

/// Protocol endpoint state.
pub struct Protocol {
    server: bool,
    format: WireFormat,
    login_sent: bool,
    authed: bool,
    agent_uuid: Option<String>,
    token: String,
}

impl Protocol {
    /// Client-side endpoint.
    pub fn client(format: WireFormat) -> Self {
        Self::with_role(format, false)
    }

    /// Server-side endpoint.
    pub fn server(format: WireFormat) -> Self {
        Self::with_role(format, true)
    }

    fn with_role(format: WireFormat, server: bool) -> Self {
        Self {
            server,
            format,
            login_sent: false,
            authed: false,
            agent_uuid: None,
            token: String::new(),
        }
    }

    /// `true` once the login exchange has completed.
    pub fn authenticated(&self) -> bool {
        self.authed
    }

    /// The token presented at login.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The agent uuid presented at login, if any.
    pub fn agent_uuid(&self) -> Option<&str> {
        self.agent_uuid.as_deref()
    }

    /// Builds the client's `login` command.
    ///
    /// Must be sent before any other frame.
    pub fn login(
        &mut self,
        agent_uuid: Option<&str>,
        token: &str,
    ) -> Result<Payload, ProtocolError> {
        let mut data = Map::new();
        data.insert("token".into(), Value::String(token.into()));
        if let Some(uuid) = agent_uuid {
            data.insert("agent_uuid".into(), Value::String(uuid.into()));
        }
        let frame = Frame::command("login")?.with_data(Value::Object(data))?;
        self.login_sent = true;
        self.agent_uuid = agent_uuid.map(str::to_owned);
        self.token = token.to_owned();
        self.encode(&frame)
    }

    /// Encodes an outbound frame in the negotiated wire format.
    pub fn encode(&self, frame: &Frame) -> Result<Payload, ProtocolError> {
        Ok(match self.format {
            WireFormat::Json => Payload::Text(frame.to_json()?),
            WireFormat::Binary => Payload::Binary(frame.to_bytes()?),
        })
    }

    /// Parses an inbound payload and classifies it.
    pub fn decode(&mut self, payload: &Payload) -> Result<Action, ProtocolError> {
        let frame = match (self.format, payload) {
            (WireFormat::Json, Payload::Text(text)) => Frame::from_json(text)?,
            (WireFormat::Binary, Payload::Binary(buf)) => Frame::from_bytes(buf)?,
            _ => return Err(ProtocolError::WrongWireFormat),
        };
        self.classify(frame)
    }

    fn classify(&mut self, frame: Frame) -> Result<Action, ProtocolError> {
        if self.server && !self.authed {
            return self.recv_auth(frame);
        }
        if !self.server && !self.login_sent {
            return Err(ProtocolError::AuthRequired);
        }
        if !self.server && !self.authed {
            match frame.name() {
                "login-ok" => {
                    self.authed = true;
                    return Ok(Action::AckAuth(frame));
                }
                "login-fail" | "login-failed" => {
                    return Err(ProtocolError::LoginRejected(frame.name().to_owned()));
                }
                _ => {}
            }
        }
        if frame.kind() == Kind::Command && frame.name() == "ping" {
            let pong = frame.reply().named("pong")?;
            return Ok(Action::SendFrame(pong));
        }
        Ok(Action::RecvFrame(frame))
    }

    fn recv_auth(&mut self, frame: Frame) -> Result<Action, ProtocolError> {
        if frame.kind() != Kind::Command || frame.name() != "login" {
            return Err(ProtocolError::ExpectedLogin {
                kind: frame.kind(),
                name: frame.name().to_owned(),
            });
        }
        let token = frame
            .data()
            .get("token")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingToken)?
            .to_owned();
        let agent_uuid = frame
            .data()
            .get("agent_uuid")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.authed = true;
        self.token = token.clone();
        self.agent_uuid = agent_uuid.clone();
        Ok(Action::RecvAuth {
            frame,
            agent_uuid,
            token,
        })
    }
}
