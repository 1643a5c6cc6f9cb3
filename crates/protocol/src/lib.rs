//! Wire protocol for framelink agents.
//!
//! A [`Frame`] is the unit of communication: a named, uuid-identified
//! envelope with a [`Kind`] and two JSON-object payloads (`data` and
//! `meta`). Frames travel as JSON text or as a compact length-prefixed
//! binary layout; [`Protocol`] layers the login-first state machine on
//! top of either encoding.

pub mod codec;
pub mod error;
pub mod frame;
pub mod kind;
pub mod protocol;

pub use error::{FrameError, ProtocolError};
pub use frame::{Frame, FrameLimits};
pub use kind::Kind;
pub use protocol::{Action, Payload, Protocol, WireFormat};
