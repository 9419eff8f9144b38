//! Error types for the modem link

use std::time::Duration;
use thiserror::Error;

/// Result type for modem link operations
pub type Result<T> = std::result::Result<T, Gdl90Error>;

/// Modem link error types
#[derive(Debug, Error)]
pub enum Gdl90Error {
    /// A bounded read produced nothing before its deadline
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// Transient transport condition (interrupted or would-block read)
    #[error("Transport interrupted: {0}")]
    Interrupted(String),

    /// Transport reached end of stream or was closed
    #[error("Transport closed")]
    TransportClosed,

    /// Unrecoverable transport I/O failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Command did not reach a terminator line in time
    #[error("No response to {command:?} within {timeout:?}")]
    ProtocolTimeout { command: String, timeout: Duration },

    /// Frame header was not a recognized `IPD,<len>:` header
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame payload too short for its message identifier
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Background task failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Gdl90Error {
    /// Whether a running loop should keep going after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Gdl90Error::Timeout(_) | Gdl90Error::Interrupted(_))
    }

    /// Whether the transport can no longer be used
    pub fn is_fatal_transport(&self) -> bool {
        matches!(self, Gdl90Error::TransportClosed | Gdl90Error::Transport(_))
    }
}

impl From<std::io::Error> for Gdl90Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Gdl90Error::Interrupted(err.to_string())
            }
            ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::NotConnected => Gdl90Error::TransportClosed,
            _ => Gdl90Error::Transport(err.to_string()),
        }
    }
}
