//! `+IPD` frames delivered by the modem once the UDP socket is open
//!
//! Wire format: `+IPD,<len>:<len bytes>`. Firmware with remote info enabled
//! sends `+IPD,<len>,<ip>,<port>:`; only the length field is used.

use crate::error::{Gdl90Error, Result};
use crate::message::Message;

/// Byte that starts every frame
pub const FRAME_START: u8 = b'+';

/// Byte that ends every frame header
pub const HEADER_END: u8 = b':';

/// Expected header prefix after the start marker
pub const HEADER_PREFIX: &[u8] = b"IPD,";

/// One length-prefixed unit recovered from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Length announced by the header
    pub length: usize,
    /// Exactly `length` payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Pair a header length with its payload
    ///
    /// Fails unless the payload is exactly as long as announced.
    pub fn new(length: usize, payload: Vec<u8>) -> Result<Self> {
        if payload.len() != length {
            return Err(Gdl90Error::MalformedFrame(format!(
                "expected {} payload bytes, got {}",
                length,
                payload.len()
            )));
        }
        Ok(Self { length, payload })
    }

    /// Interpret the payload
    pub fn message(&self) -> Result<Message> {
        Message::decode(&self.payload)
    }
}

/// Parse the payload length out of a header
///
/// `header` holds the bytes following the start marker, with or without the
/// trailing `:`.
pub fn parse_header(header: &[u8]) -> Result<usize> {
    let header = header.strip_suffix(&[HEADER_END]).unwrap_or(header);
    let fields = header.strip_prefix(HEADER_PREFIX).ok_or_else(|| {
        Gdl90Error::MalformedFrame(format!(
            "header {:?} lacks IPD prefix",
            header.escape_ascii().to_string()
        ))
    })?;

    let length = fields.split(|&b| b == b',').next().unwrap_or_default();
    if length.is_empty() || !length.iter().all(u8::is_ascii_digit) {
        return Err(Gdl90Error::MalformedFrame(format!(
            "invalid length field {:?}",
            length.escape_ascii().to_string()
        )));
    }

    std::str::from_utf8(length)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Gdl90Error::MalformedFrame("length field out of range".into()))
}
