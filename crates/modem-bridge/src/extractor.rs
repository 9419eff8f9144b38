//! Frame extractor for the raw byte stream after the handshake
//!
//! Scans for `+`, reads a bounded `IPD,<len>:` header, reads exactly `len`
//! payload bytes and decodes the GDL90 message. Anything that does not fit
//! is counted as noise or discarded, and scanning resumes; only a closed or
//! failed transport ends extraction.

use crate::sink::EventSink;
use crate::transport::ModemReader;
use gdl90_core::frame::{FRAME_START, HEADER_END};
use gdl90_core::{Frame, Gdl90Error, Message, Result, parse_header};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// What to do with messages whose identifier is not interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownMessagePolicy {
    /// Silently drop them
    #[default]
    Drop,
    /// Hand them to the sink with their raw bytes
    Log,
}

/// Longest header the firmware sends: `IPD,<len>,<ip>,<port>:` with a
/// four digit length, dotted quad and five digit port
pub const MAX_HEADER_LEN: usize = 32;

/// Configuration for frame extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Timeout for each read
    pub read_timeout: Duration,
    /// Header bytes read after `+` before giving up on a terminator
    pub max_header_len: usize,
    /// Largest payload accepted
    pub max_payload_len: usize,
    /// Handling of unrecognized identifiers
    pub unknown_messages: UnknownMessagePolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            max_header_len: MAX_HEADER_LEN,
            max_payload_len: 2048,
            unknown_messages: UnknownMessagePolicy::default(),
        }
    }
}

/// Recovers frames from the modem's byte stream
pub struct FrameExtractor<'a, R: ModemReader> {
    reader: &'a mut R,
    config: ExtractorConfig,
    /// Bytes skipped since the last decoded message
    skipped: usize,
}

impl<'a, R: ModemReader> FrameExtractor<'a, R> {
    pub fn new(reader: &'a mut R, config: ExtractorConfig) -> Self {
        Self {
            reader,
            config,
            skipped: 0,
        }
    }

    /// Decode messages into `sink` until the transport fails
    pub async fn run(&mut self, sink: &dyn EventSink) -> Result<()> {
        loop {
            let (message, skipped) = self.next_message(sink).await?;
            sink.message(&message, skipped);
        }
    }

    /// Next message passing the unknown-identifier policy
    ///
    /// Discarded frames are reported to `sink`. Returns the message with the
    /// number of bytes skipped before it.
    pub async fn next_message(&mut self, sink: &dyn EventSink) -> Result<(Message, usize)> {
        loop {
            let frame = match self.next_frame().await {
                Ok(frame) => frame,
                Err(e) if e.is_fatal_transport() => return Err(e),
                Err(e) => {
                    sink.frame_error(&e, self.skipped);
                    continue;
                }
            };

            match frame.message() {
                Ok(message) => {
                    let skipped = std::mem::take(&mut self.skipped);
                    if !message.is_recognized()
                        && self.config.unknown_messages == UnknownMessagePolicy::Drop
                    {
                        trace!("Dropped GDL90 message id {}", message.id());
                        continue;
                    }
                    return Ok((message, skipped));
                }
                Err(e) => sink.frame_error(&e, self.skipped),
            }
        }
    }

    /// Scan to the next well-formed frame
    ///
    /// Fails with the transport error if the transport closed, or with the
    /// reason the candidate frame was discarded.
    pub async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match self.read_byte().await {
                Ok(FRAME_START) => break,
                Ok(_) => self.skipped += 1,
                Err(e) if e.is_transient() => trace!("Idle: {}", e),
                Err(e) => return Err(e),
            }
        }

        let length = self.read_header().await?;
        if length > self.config.max_payload_len {
            return Err(Gdl90Error::MalformedFrame(format!(
                "length {} exceeds {}",
                length, self.config.max_payload_len
            )));
        }

        let payload = self
            .reader
            .read_exact(length, self.config.read_timeout)
            .await
            .inspect_err(|e| debug!("Payload read failed: {}", e))?;
        Frame::new(length, payload)
    }

    /// Read the header following a start marker and parse its length
    async fn read_header(&mut self) -> Result<usize> {
        let mut header = Vec::with_capacity(self.config.max_header_len);

        while header.len() < self.config.max_header_len {
            let byte = match self.read_byte().await {
                Ok(byte) => byte,
                Err(e) => {
                    self.skipped += header.len() + 1;
                    if !e.is_fatal_transport() {
                        warn!("Header read failed: {}", e);
                    }
                    return Err(e);
                }
            };

            if byte == FRAME_START {
                // Restart on a fresh marker; the bytes so far were noise
                self.skipped += header.len() + 1;
                header.clear();
                continue;
            }

            header.push(byte);
            if byte == HEADER_END {
                return parse_header(&header).inspect_err(|_| {
                    self.skipped += header.len() + 1;
                });
            }
        }

        self.skipped += header.len() + 1;
        Err(Gdl90Error::MalformedFrame(format!(
            "no header terminator within {} bytes",
            self.config.max_header_len
        )))
    }

    async fn read_byte(&mut self) -> Result<u8> {
        let bytes = self.reader.read_exact(1, self.config.read_timeout).await?;
        Ok(bytes[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use crate::transport::StreamReader;
    use tokio_test::io::Builder;

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            read_timeout: Duration::from_millis(20),
            ..Default::default()
        }
    }

    async fn collect(
        reader: &mut StreamReader<tokio_test::io::Mock>,
        config: ExtractorConfig,
    ) -> (Vec<(Message, usize)>, RecordingSink) {
        let sink = RecordingSink::default();
        let mut extractor = FrameExtractor::new(reader, config);
        let err = extractor.run(&sink).await.unwrap_err();
        assert!(matches!(err, Gdl90Error::TransportClosed), "unexpected {}", err);
        (sink.messages(), sink)
    }

    fn altitude(message: &Message) -> u32 {
        match message {
            Message::GeometricAltitude { altitude_ft, .. } => *altitude_ft,
            other => panic!("expected altitude, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_altitude_frame() {
        let mut reader = StreamReader::new(Builder::new().read(b"+IPD,4:\x00\x0b\x00\x0a").build());

        let (messages, sink) = collect(&mut reader, config()).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0.id(), 11);
        assert_eq!(altitude(&messages[0].0), 50);
        assert_eq!(messages[0].1, 0);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_resynchronizes_after_noise() {
        let mut reader = StreamReader::new(
            Builder::new()
                .read(b"garbage+IPD,2:\x00\x00")
                .read(b"\r\nxyz")
                .read(b"+IPD,4:\x7e\x0b\x00\x64")
                .build(),
        );

        let (messages, _) = collect(&mut reader, config()).await;

        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0].0, Message::Heartbeat { .. }));
        assert_eq!(messages[0].1, 7);
        assert_eq!(altitude(&messages[1].0), 500);
        assert_eq!(messages[1].1, 5);
    }

    #[tokio::test]
    async fn test_malformed_header_resumes_scanning() {
        let mut reader = StreamReader::new(
            Builder::new()
                .read(b"+IPD,:")
                .read(b"+CIPSTATUS:")
                .read(b"+IPD,4:\x00\x0b\x00\x01")
                .build(),
        );

        let (messages, sink) = collect(&mut reader, config()).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(altitude(&messages[0].0), 5);
        assert_eq!(sink.errors().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_header_at_end_of_stream_does_not_block() {
        let mut reader = StreamReader::new(Builder::new().read(b"+IPD,:").build());

        let (messages, sink) =
            tokio::time::timeout(Duration::from_secs(2), collect(&mut reader, config()))
                .await
                .unwrap();

        assert!(messages.is_empty());
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_and_oversized_lengths_are_discarded() {
        let mut reader = StreamReader::new(
            Builder::new()
                .read(b"+IPD,0:")
                .read(b"+IPD,99999:")
                .read(b"+IPD,1234567890123456789012345678901234")
                .read(b"+IPD,4:\x00\x0b\x00\x02")
                .build(),
        );

        let (messages, sink) = collect(&mut reader, config()).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(altitude(&messages[0].0), 10);
        assert_eq!(sink.errors().len(), 3);
    }

    #[tokio::test]
    async fn test_header_with_remote_info() {
        let mut reader = StreamReader::new(
            Builder::new()
                .read(b"+IPD,4,192.168.10.1,4000:\x00\x0b\x00\x0a")
                .read(b"+IPD,2,255.255.255.255,65535:\x7e\x00")
                .build(),
        );

        let (messages, sink) = collect(&mut reader, config()).await;

        assert!(sink.errors().is_empty(), "errors: {:?}", sink.errors());
        assert_eq!(messages.len(), 2);
        assert_eq!(altitude(&messages[0].0), 50);
        assert!(matches!(messages[1].0, Message::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn test_marker_inside_header_restarts_it() {
        let mut reader = StreamReader::new(Builder::new().read(b"++IPD,4:\x00\x0b\x00\x03").build());

        let (messages, _) = collect(&mut reader, config()).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(altitude(&messages[0].0), 15);
        assert_eq!(messages[0].1, 1);
    }

    #[tokio::test]
    async fn test_unknown_identifier_policy() {
        let stream = b"+IPD,3:\x7e\x65\x01+IPD,2:\x7e\x0a";

        let mut reader = StreamReader::new(Builder::new().read(stream).build());
        let (messages, _) = collect(&mut reader, config()).await;
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0].0, Message::OwnshipReport { .. }));

        let mut reader = StreamReader::new(Builder::new().read(stream).build());
        let logging = ExtractorConfig {
            unknown_messages: UnknownMessagePolicy::Log,
            ..config()
        };
        let (messages, _) = collect(&mut reader, logging).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0.id(), 101);
    }

    #[tokio::test]
    async fn test_stalled_payload_is_discarded() {
        let mut reader = StreamReader::new(
            Builder::new()
                .read(b"+IPD,4:\x00\x0b")
                .wait(Duration::from_millis(60))
                .read(b"+IPD,4:\x00\x0b\x00\x0a")
                .build(),
        );

        let (messages, sink) = collect(&mut reader, config()).await;

        assert_eq!(sink.errors().len(), 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(altitude(&messages[0].0), 50);
        // The two stranded payload bytes were rescanned as noise
        assert_eq!(messages[0].1, 2);
    }
}
