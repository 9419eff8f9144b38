//! GDL90 messages carried inside received UDP datagrams
//!
//! Payload layout: byte 0 is the framing flag (ignored), byte 1 the message
//! identifier, the rest is the type-specific body.

use crate::error::{Gdl90Error, Result};
use serde::{Deserialize, Serialize};

/// Message identifier constants
pub mod message_id {
    pub const HEARTBEAT: u8 = 0;
    pub const OWNSHIP_REPORT: u8 = 10;
    pub const OWNSHIP_GEOMETRIC_ALTITUDE: u8 = 11;
}

/// Feet per unit of the raw geometric altitude field
pub const ALTITUDE_RESOLUTION_FT: u32 = 5;

/// A decoded GDL90 message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum Message {
    /// Heartbeat, surfaced raw
    Heartbeat {
        #[serde(rename = "Payload")]
        payload: Vec<u8>,
    },

    /// Ownship report, surfaced raw
    OwnshipReport {
        #[serde(rename = "Payload")]
        payload: Vec<u8>,
    },

    /// Ownship geometric altitude
    GeometricAltitude {
        #[serde(rename = "AltitudeFt")]
        altitude_ft: u32,
        #[serde(rename = "Payload")]
        payload: Vec<u8>,
    },

    /// Any identifier not interpreted above
    Unknown {
        #[serde(rename = "Id")]
        id: u8,
        #[serde(rename = "Payload")]
        payload: Vec<u8>,
    },
}

impl Message {
    /// Decode a frame payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let id = *payload.get(1).ok_or_else(|| {
            Gdl90Error::MalformedMessage(format!(
                "payload of {} bytes has no message id",
                payload.len()
            ))
        })?;
        let payload = payload.to_vec();

        let message = match id {
            message_id::HEARTBEAT => Message::Heartbeat { payload },
            message_id::OWNSHIP_REPORT => Message::OwnshipReport { payload },
            message_id::OWNSHIP_GEOMETRIC_ALTITUDE => {
                let raw = match payload.get(2..4) {
                    Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
                    _ => {
                        return Err(Gdl90Error::MalformedMessage(format!(
                            "altitude report needs 4 bytes, got {}",
                            payload.len()
                        )));
                    }
                };
                Message::GeometricAltitude {
                    altitude_ft: u32::from(raw) * ALTITUDE_RESOLUTION_FT,
                    payload,
                }
            }
            id => Message::Unknown { id, payload },
        };

        Ok(message)
    }

    /// Message identifier byte
    pub fn id(&self) -> u8 {
        match self {
            Message::Heartbeat { .. } => message_id::HEARTBEAT,
            Message::OwnshipReport { .. } => message_id::OWNSHIP_REPORT,
            Message::GeometricAltitude { .. } => message_id::OWNSHIP_GEOMETRIC_ALTITUDE,
            Message::Unknown { id, .. } => *id,
        }
    }

    /// Raw payload the message was decoded from
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Heartbeat { payload }
            | Message::OwnshipReport { payload }
            | Message::GeometricAltitude { payload, .. }
            | Message::Unknown { payload, .. } => payload,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Message::Unknown { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_altitude_decoding() {
        let msg = Message::decode(&[0x00, 0x0b, 0x00, 0x0a]).unwrap();
        assert_eq!(msg.id(), 11);
        match msg {
            Message::GeometricAltitude { altitude_ft, .. } => assert_eq!(altitude_ft, 50),
            _ => panic!("Wrong message type"),
        }

        // Big-endian, full range
        let msg = Message::decode(&[0x7e, 0x0b, 0xff, 0xff, 0x00, 0x0a]).unwrap();
        match msg {
            Message::GeometricAltitude { altitude_ft, .. } => assert_eq!(altitude_ft, 327_675),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_raw_messages() {
        let msg = Message::decode(&[0x7e, 0x00, 0x81, 0x41]).unwrap();
        assert_eq!(msg, Message::Heartbeat { payload: vec![0x7e, 0x00, 0x81, 0x41] });

        let msg = Message::decode(&[0x7e, 0x0a]).unwrap();
        assert!(matches!(msg, Message::OwnshipReport { .. }));

        let msg = Message::decode(&[0x7e, 0x65, 0x01]).unwrap();
        assert_eq!(msg.id(), 101);
        assert!(!msg.is_recognized());
        assert_eq!(msg.payload(), &[0x7e, 0x65, 0x01]);
    }

    #[test]
    fn test_short_payloads_are_rejected() {
        assert!(matches!(
            Message::decode(&[]),
            Err(Gdl90Error::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::decode(&[0x7e]),
            Err(Gdl90Error::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::decode(&[0x7e, 0x0b, 0x01]),
            Err(Gdl90Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_json_format() {
        let msg = Message::GeometricAltitude {
            altitude_ft: 50,
            payload: vec![0, 11, 0, 10],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"Type\":\"GeometricAltitude\""));
        assert!(json.contains("\"AltitudeFt\":50"));
    }
}
