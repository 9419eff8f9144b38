//! AT command set used to bring up the UDP listener

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Value prefix of the `AT+CIPSTATUS` response
pub const STATUS_PREFIX: &str = "STATUS:";

/// Value prefix of the `AT+CWMODE?` response
pub const CWMODE_PREFIX: &str = "+CWMODE:";

/// Connection state codes reported after `STATUS:`
pub mod status {
    /// Station connected to an access point and got an IP
    pub const GOT_IP: i64 = 2;
}

/// Wireless mode codes reported after `+CWMODE:`
pub mod wifi_mode {
    /// Station mode
    pub const STATION: i64 = 1;
}

/// Fixed command strings
pub mod at {
    /// Restart the module
    pub const RESET: &str = "AT+RST";
    /// Liveness probe
    pub const PING: &str = "AT";
    /// Connection status query
    pub const STATUS: &str = "AT+CIPSTATUS";
    /// Wireless mode query
    pub const MODE_QUERY: &str = "AT+CWMODE?";
    /// Persist station mode
    pub const MODE_SET_STATION: &str = "AT+CWMODE_DEF=1";
}

/// Build the command opening a UDP socket bound to `local_port`
pub fn udp_listen(remote: Ipv4Addr, remote_port: u16, local_port: u16) -> String {
    format!(
        "AT+CIPSTART=\"UDP\",\"{}\",{},{}",
        remote, remote_port, local_port
    )
}

/// A command plus the value prefixes worth capturing from its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command text, without terminator
    pub command: String,
    /// Prefixes of value-bearing lines to capture
    pub value_prefixes: Vec<&'static str>,
}

impl CommandSpec {
    /// Command whose response is only awaited, not inspected
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            value_prefixes: Vec::new(),
        }
    }

    /// Also capture values following `prefix`
    pub fn capture(mut self, prefix: &'static str) -> Self {
        self.value_prefixes.push(prefix);
        self
    }

    /// Whether the response needs to be inspected
    pub fn wants_values(&self) -> bool {
        !self.value_prefixes.is_empty()
    }

    /// Bytes written to the transport
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.command.len() + 2);
        buf.extend_from_slice(self.command.as_bytes());
        buf.extend_from_slice(crate::line::CRLF);
        buf
    }
}

/// Values captured from a command response, most recent per prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedValues {
    values: HashMap<&'static str, i64>,
}

impl CapturedValues {
    /// Record a value, replacing any earlier one for the same prefix
    pub fn record(&mut self, prefix: &'static str, value: i64) {
        self.values.insert(prefix, value);
    }

    /// Value captured for `prefix`
    pub fn get(&self, prefix: &str) -> Option<i64> {
        self.values.get(prefix).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
