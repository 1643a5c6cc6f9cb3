//! Compact binary frame layout.
//!
//! ```text
//! [large:u8]
//! [name_size:u32 BE] [data_size:u32 BE] [meta_size:u32 BE]
//! [kind:u16 BE]
//! [uuid: 32 bytes ASCII hex]
//! [name: UTF-8] [data: JSON UTF-8] [meta: JSON UTF-8]
//! ```
//!
//! There is no outer framing; the layout above is the exact on-wire
//! form. The header is fixed at [`HEADER_LEN`] bytes.

use serde_json::Value;

use crate::error::FrameError;
use crate::frame::{Frame, UUID_LEN, WireFrame};

/// Fixed header size: flag + three lengths + kind + uuid.
pub const HEADER_LEN: usize = 1 + 4 + 4 + 4 + 2 + UUID_LEN;

pub(crate) fn encode(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let data_json = serde_json::to_vec(frame.data())?;
    let meta_json = serde_json::to_vec(frame.meta())?;
    let name = frame.name().as_bytes();

    let mut buf = Vec::with_capacity(HEADER_LEN + name.len() + data_json.len() + meta_json.len());
    buf.push(frame.is_large() as u8);
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(data_json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(meta_json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(frame.kind() as u16).to_be_bytes());
    buf.extend_from_slice(frame.uuid().as_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&data_json);
    buf.extend_from_slice(&meta_json);
    Ok(buf)
}

pub(crate) fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::Truncated {
            need: HEADER_LEN,
            have: buf.len(),
        });
    }

    let large = buf[0] != 0;
    let name_size = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
    let data_size = u32::from_be_bytes(buf[5..9].try_into().unwrap()) as usize;
    let meta_size = u32::from_be_bytes(buf[9..13].try_into().unwrap()) as usize;
    let kind = u16::from_be_bytes(buf[13..15].try_into().unwrap());
    let uuid = String::from_utf8(buf[15..15 + UUID_LEN].to_vec())?;

    let expected = HEADER_LEN + name_size + data_size + meta_size;
    if buf.len() != expected {
        return Err(FrameError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }

    let name_end = HEADER_LEN + name_size;
    let data_end = name_end + data_size;
    let name = String::from_utf8(buf[HEADER_LEN..name_end].to_vec())?;
    let data: Value = serde_json::from_slice(&buf[name_end..data_end])?;
    let meta: Value = serde_json::from_slice(&buf[data_end..])?;

    Frame::from_wire(
        WireFrame {
            name,
            kind,
            uuid: Some(uuid),
            data: Some(data),
            meta: Some(meta),
        },
        large,
    )
}
