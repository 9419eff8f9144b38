//! Serial modem link for GDL90 over an ESP8266
//!
//! This crate provides:
//! - Transport abstractions (ModemReader/ModemWriter traits) and a serial transport
//! - Background line reader feeding a readiness signal and scoped captures
//! - Command driver and the handshake that opens the UDP listener
//! - Frame extractor decoding GDL90 messages from the raw byte stream
//! - Session driver tying both phases together

pub mod capture;
pub mod driver;
pub mod extractor;
pub mod handshake;
pub mod readiness;
pub mod reader;
pub mod serial;
pub mod session;
pub mod sink;
pub mod transport;

pub use driver::{CommandDriver, CommandResponse, Commander};
pub use extractor::{ExtractorConfig, FrameExtractor, UnknownMessagePolicy};
pub use handshake::{Handshake, HandshakeConfig, HandshakeReport, backoff_schedule};
pub use session::{Session, SessionConfig};
pub use sink::{EventSink, JsonSink, TracingSink};
pub use transport::{ModemReader, ModemWriter, StreamReader, StreamWriter};
