//! The frame envelope and its JSON wire form.
//!
//! A frame is immutable once built: every constructor and builder
//! method validates before returning, so a `Frame` in hand always
//! satisfies the wire invariants.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::FrameError;
use crate::kind::Kind;

/// Minimum frame name length in bytes.
pub const NAME_MIN: usize = 2;

/// Maximum frame name length in bytes.
pub const NAME_MAX: usize = 128;

/// Frame uuid length (32 lowercase hex characters).
pub const UUID_LEN: usize = 32;

/// Serialized-size caps for the payload fields.
///
/// The caps apply unless the frame carries the `large` flag; callers
/// that negotiate bigger payloads can validate against their own
/// limits via [`Frame::validate_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum serialized `data` size in bytes.
    pub data_max: usize,
    /// Maximum serialized `meta` size in bytes.
    pub meta_max: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            data_max: 512,
            meta_max: 256,
        }
    }
}

/// The typed, uuid-identified unit of communication between agents.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    name: String,
    kind: Kind,
    uuid: String,
    data: Map<String, Value>,
    meta: Map<String, Value>,
    large: bool,
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Frame {
    /// Creates a frame with a fresh uuid and empty payloads.
    pub fn new(name: impl Into<String>, kind: Kind) -> Result<Self, FrameError> {
        let frame = Self {
            name: name.into(),
            kind,
            uuid: new_uuid(),
            data: Map::new(),
            meta: Map::new(),
            large: false,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Shorthand for an EVENT frame.
    pub fn event(name: impl Into<String>) -> Result<Self, FrameError> {
        Self::new(name, Kind::Event)
    }

    /// Shorthand for a COMMAND frame.
    pub fn command(name: impl Into<String>) -> Result<Self, FrameError> {
        Self::new(name, Kind::Command)
    }

    /// Replaces `data`. The value must be a JSON object.
    pub fn with_data(mut self, data: Value) -> Result<Self, FrameError> {
        let Value::Object(map) = data else {
            return Err(FrameError::NotAnObject { field: "data" });
        };
        self.data = map;
        self.validate()?;
        Ok(self)
    }

    /// Replaces `meta`. The value must be a JSON object.
    pub fn with_meta(mut self, meta: Value) -> Result<Self, FrameError> {
        let Value::Object(map) = meta else {
            return Err(FrameError::NotAnObject { field: "meta" });
        };
        self.meta = map;
        self.validate()?;
        Ok(self)
    }

    /// Inserts a single `meta` entry, keeping the rest.
    pub fn with_meta_entry(
        mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Self, FrameError> {
        self.meta.insert(key.into(), value);
        self.validate()?;
        Ok(self)
    }

    /// Replaces the uuid (normally assigned at construction).
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Result<Self, FrameError> {
        self.uuid = uuid.into();
        self.validate()?;
        Ok(self)
    }

    /// Renames the frame.
    pub fn named(mut self, name: impl Into<String>) -> Result<Self, FrameError> {
        self.name = name.into();
        self.validate()?;
        Ok(self)
    }

    /// Marks the frame as large, lifting the payload size caps.
    ///
    /// Only honored by the binary codec; set it before attaching a
    /// payload that exceeds the defaults.
    pub fn large(mut self) -> Self {
        self.large = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn is_large(&self) -> bool {
        self.large
    }

    /// The uuid this frame replies to, when `meta.reply_to` is set.
    pub fn reply_to(&self) -> Option<&str> {
        self.meta.get("reply_to").and_then(Value::as_str)
    }

    /// Derives a reply frame.
    ///
    /// The reply carries `meta.reply_to` set to this frame's uuid and
    /// keeps this frame's name until [`named`](Self::named) changes it.
    /// Replying to a REQUEST yields a RESPONSE; any other kind is
    /// preserved.
    pub fn reply(&self) -> Frame {
        let kind = if self.kind == Kind::Request {
            Kind::Response
        } else {
            self.kind
        };
        let mut meta = Map::new();
        meta.insert("reply_to".into(), Value::String(self.uuid.clone()));
        Frame {
            name: self.name.clone(),
            kind,
            uuid: new_uuid(),
            data: Map::new(),
            meta,
            large: false,
        }
    }

    /// Validates against the default payload caps.
    pub fn validate(&self) -> Result<(), FrameError> {
        self.validate_with(&FrameLimits::default())
    }

    /// Validates the wire invariants, with caller-supplied payload caps.
    pub fn validate_with(&self, limits: &FrameLimits) -> Result<(), FrameError> {
        if self.name.trim().is_empty() {
            return Err(FrameError::BlankName);
        }
        if self.name.len() < NAME_MIN || self.name.len() > NAME_MAX {
            return Err(FrameError::NameLength {
                len: self.name.len(),
            });
        }
        if self.uuid.len() != UUID_LEN || !self.uuid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FrameError::InvalidUuid);
        }
        if !self.large {
            let data_size = serde_json::to_string(&self.data)?.len();
            if data_size > limits.data_max {
                return Err(FrameError::TooLarge {
                    field: "data",
                    size: data_size,
                    max: limits.data_max,
                });
            }
            let meta_size = serde_json::to_string(&self.meta)?.len();
            if meta_size > limits.meta_max {
                return Err(FrameError::TooLarge {
                    field: "meta",
                    size: meta_size,
                    max: limits.meta_max,
                });
            }
        }
        Ok(())
    }

    /// Serializes to the JSON wire form.
    ///
    /// Empty `data`/`meta` are omitted; the `large` flag never appears
    /// on the JSON wire.
    pub fn to_json(&self) -> Result<String, FrameError> {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::String(self.name.clone()));
        obj.insert("kind".into(), Value::from(self.kind as u16));
        obj.insert("uuid".into(), Value::String(self.uuid.clone()));
        if !self.data.is_empty() {
            obj.insert("data".into(), Value::Object(self.data.clone()));
        }
        if !self.meta.is_empty() {
            obj.insert("meta".into(), Value::Object(self.meta.clone()));
        }
        Ok(serde_json::to_string(&Value::Object(obj))?)
    }

    /// Parses the JSON wire form, validating all invariants.
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        let wire: WireFrame = serde_json::from_str(text)?;
        Self::from_wire(wire, false)
    }

    /// Serializes to the compact binary layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        crate::codec::encode(self)
    }

    /// Parses the compact binary layout.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FrameError> {
        crate::codec::decode(buf)
    }

    pub(crate) fn from_wire(wire: WireFrame, large: bool) -> Result<Self, FrameError> {
        let kind = Kind::try_from(wire.kind)?;
        let data = match wire.data {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(FrameError::NotAnObject { field: "data" }),
        };
        let meta = match wire.meta {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(FrameError::NotAnObject { field: "meta" }),
        };
        let frame = Self {
            name: wire.name,
            kind,
            uuid: wire.uuid.unwrap_or_else(new_uuid),
            data,
            meta,
            large,
        };
        frame.validate()?;
        Ok(frame)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} [{}]", self.kind, self.name, &self.uuid[..8])
    }
}

/// Raw wire shape, before invariant checks.
#[derive(Deserialize)]
pub(crate) struct WireFrame {
    pub(crate) name: String,
    pub(crate) kind: u16,
    #[serde(default)]
    pub(crate) uuid: Option<String>,
    #[serde(default)]
    pub(crate) data: Option<Value>,
    #[serde(default)]
    pub(crate) meta: Option<Value>,
}
