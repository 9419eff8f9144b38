//! Output sinks for observed lines and decoded messages
//!
//! The link never formats output itself; everything it observes is handed
//! to an [`EventSink`].

use gdl90_core::{Gdl90Error, Line, Message};
use std::io::{Stdout, Write};
use std::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Receiver of everything the link observes
pub trait EventSink: Send + Sync + 'static {
    /// A line read while in command mode
    fn line(&self, line: &Line);

    /// A message decoded from a frame, after `skipped` noise bytes
    fn message(&self, message: &Message, skipped: usize);

    /// A frame that was discarded
    fn frame_error(&self, error: &Gdl90Error, skipped: usize) {
        debug!(skipped, "Discarded frame: {}", error);
    }

    /// A line read while draining the transport after a failure
    fn diagnostic(&self, line: &Line) {
        self.line(line);
    }
}

/// Sink that reports through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn line(&self, line: &Line) {
        let content = line.content();
        if content.is_empty() {
            trace!(target: "modem", "<blank>");
        } else {
            info!(target: "modem", kind = ?line.kind(), "{}", content);
        }
    }

    fn message(&self, message: &Message, skipped: usize) {
        match message {
            Message::GeometricAltitude { altitude_ft, .. } => {
                info!(target: "gdl90", skipped, "GDL90 Altitude: {} ft", altitude_ft);
            }
            other => {
                info!(
                    target: "gdl90",
                    skipped,
                    "GDL90 ID#{}: {:02x?}",
                    other.id(),
                    other.payload()
                );
            }
        }
    }

    fn diagnostic(&self, line: &Line) {
        warn!(target: "modem", "Drained: {}", line.content());
    }
}

/// Sink that writes one JSON object per message, stdout by default
///
/// Lines still go to `tracing` so the output carries only messages.
#[derive(Debug)]
pub struct JsonSink<W: Write + Send + 'static = Stdout> {
    out: Mutex<W>,
}

impl JsonSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send + 'static> EventSink for JsonSink<W> {
    fn line(&self, line: &Line) {
        TracingSink.line(line);
    }

    fn message(&self, message: &Message, skipped: usize) {
        let mut value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize message: {}", e);
                return;
            }
        };
        if let Some(object) = value.as_object_mut() {
            object.insert("Skipped".into(), skipped.into());
        }

        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", value).and_then(|_| out.flush()) {
            warn!("Failed to write message: {}", e);
        }
    }

    fn diagnostic(&self, line: &Line) {
        TracingSink.diagnostic(line);
    }
}
