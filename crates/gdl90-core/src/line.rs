//! Text lines emitted by the modem while in command mode
//!
//! Every response line is CR LF terminated. Lines starting with `OK` or
//! `ERROR` conclude the response cycle of the last command; lines of the
//! form `<PREFIX>:<int>` carry a value (e.g. `STATUS:2`, `+CWMODE:1`).

use serde::{Deserialize, Serialize};

/// Line delimiter of the AT command protocol
pub const CRLF: &[u8] = b"\r\n";

/// Prefix of a success terminator line
pub const OK_PREFIX: &str = "OK";

/// Prefix of an error terminator line
pub const ERROR_PREFIX: &str = "ERROR";

/// How a command concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    Ok,
    Error,
}

/// Classification of a decoded line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    Informational,
    Success,
    Error,
    Value,
}

/// One decoded line of modem output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Text content, including the delimiter if one was read
    pub text: String,
    /// Whether the bytes were not valid UTF-8 and got escaped
    pub lossy: bool,
}

impl Line {
    /// Create a line from already decoded text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lossy: false,
        }
    }

    /// Decode raw bytes, escaping them when they are not valid UTF-8
    ///
    /// Never fails: undecodable bytes still produce a line.
    pub fn decode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::new(text),
            Err(_) => Self {
                text: bytes.escape_ascii().to_string(),
                lossy: true,
            },
        }
    }

    /// Text without the trailing delimiter
    pub fn content(&self) -> &str {
        self.text.trim_end_matches(['\r', '\n'])
    }

    /// Terminator carried by this line, if any
    pub fn terminator(&self) -> Option<Terminator> {
        let content = self.content();
        if content.starts_with(OK_PREFIX) {
            Some(Terminator::Ok)
        } else if content.starts_with(ERROR_PREFIX) {
            Some(Terminator::Error)
        } else {
            None
        }
    }

    /// Classify the line
    pub fn kind(&self) -> LineKind {
        match self.terminator() {
            Some(Terminator::Ok) => LineKind::Success,
            Some(Terminator::Error) => LineKind::Error,
            None if self.split_value().is_some() => LineKind::Value,
            None => LineKind::Informational,
        }
    }

    /// Integer value following `prefix`, if the line starts with it
    pub fn value_for(&self, prefix: &str) -> Option<i64> {
        self.content()
            .strip_prefix(prefix)
            .and_then(|rest| rest.trim().parse().ok())
    }

    fn split_value(&self) -> Option<(&str, i64)> {
        let (prefix, value) = self.content().rsplit_once(':')?;
        if prefix.is_empty() {
            return None;
        }
        value.trim().parse().ok().map(|v| (prefix, v))
    }
}
