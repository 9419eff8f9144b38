//! # gdl90-core
//!
//! Protocol types for driving an ESP8266 Wi-Fi modem and decoding the GDL90
//! traffic it relays.
//!
//! This crate has no I/O. It provides:
//! - Error taxonomy shared by all crates
//! - AT response line decoding and classification
//! - The fixed AT command set and command specs
//! - `+IPD` frame header parsing
//! - GDL90 message decoding

pub mod command;
pub mod error;
pub mod frame;
pub mod line;
pub mod message;

pub use command::{CapturedValues, CommandSpec};
pub use error::{Gdl90Error, Result};
pub use frame::{Frame, parse_header};
pub use line::{CRLF, Line, LineKind, Terminator};
pub use message::{Message, message_id};
