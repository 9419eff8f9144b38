//! Session driver owning the transport for its whole lifetime
//!
//! Phase 1 runs the handshake with the line reader in the background.
//! Stopping and joining the reader hands the read half back, after which
//! phase 2 extracts frames on the session's own task. The write half is
//! closed on every exit path, including cancellation.

use crate::capture::CaptureSlot;
use crate::driver::CommandDriver;
use crate::extractor::{ExtractorConfig, FrameExtractor};
use crate::handshake::{Handshake, HandshakeConfig};
use crate::readiness::Readiness;
use crate::reader::{LineReaderHandle, ReaderShared};
use crate::sink::EventSink;
use crate::transport::{ModemReader, ModemWriter};
use gdl90_core::{CRLF, Line, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for each line read during the handshake
    pub read_timeout: Duration,
    /// Lines drained for diagnostics after a failure
    pub drain_lines: usize,
    pub handshake: HandshakeConfig,
    pub extractor: ExtractorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            drain_lines: 100,
            handshake: HandshakeConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// One run of the modem link
pub struct Session<R: ModemReader, W: ModemWriter> {
    reader: R,
    writer: W,
    config: SessionConfig,
    sink: Arc<dyn EventSink>,
}

impl<R: ModemReader, W: ModemWriter> Session<R, W> {
    pub fn new(reader: R, writer: W, config: SessionConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            reader,
            writer,
            config,
            sink,
        }
    }

    /// Run until the transport fails
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the transport fails or `shutdown` completes
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let Session {
            reader,
            mut writer,
            config,
            sink,
        } = self;

        let result = tokio::select! {
            result = drive(reader, &mut writer, &config, &sink) => result,
            _ = shutdown => {
                info!("Shutdown requested");
                Ok(())
            }
        };

        if let Err(e) = writer.close().await {
            debug!("Closing transport: {}", e);
        }
        info!("Transport closed");
        result
    }
}

async fn drive<R: ModemReader, W: ModemWriter>(
    reader: R,
    writer: &mut W,
    config: &SessionConfig,
    sink: &Arc<dyn EventSink>,
) -> Result<()> {
    let readiness = Readiness::new();
    let capture = Arc::new(CaptureSlot::new());
    let shared = ReaderShared {
        readiness: readiness.clone(),
        capture: Arc::clone(&capture),
        sink: Arc::clone(sink),
    };
    let line_reader = LineReaderHandle::spawn(reader, shared, config.read_timeout);

    let handshake = {
        let mut driver = CommandDriver::new(writer, readiness, capture);
        Handshake::new(config.handshake.clone())
            .run(&mut driver)
            .await
    };

    info!("Stopping reader thread");
    let mut reader = line_reader.stop().await?;

    let result = match handshake {
        Ok(report) => {
            info!(
                connected = report.connected(),
                mode_changed = report.mode_changed,
                "Watching output"
            );
            FrameExtractor::new(&mut reader, config.extractor.clone())
                .run(sink.as_ref())
                .await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!("Session failed: {}", e);
        drain(&mut reader, config, sink.as_ref()).await;
    }
    result
}

/// Report whatever the modem still has to say, up to `drain_lines` lines
///
/// Stops early once the transport goes quiet or closes.
async fn drain<R: ModemReader>(reader: &mut R, config: &SessionConfig, sink: &dyn EventSink) {
    for _ in 0..config.drain_lines {
        match reader.read_until(CRLF, config.read_timeout).await {
            Ok(bytes) => sink.diagnostic(&Line::decode(&bytes)),
            Err(e) => {
                debug!("Drain finished: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use crate::transport::{StreamReader, StreamWriter};
    use gdl90_core::{Gdl90Error, Message};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_millis(20),
            drain_lines: 100,
            handshake: HandshakeConfig {
                settle: Duration::from_millis(10),
                command_timeout: Duration::from_millis(500),
                status_backoff: crate::handshake::backoff_schedule(Duration::from_millis(5)),
                ..Default::default()
            },
            extractor: ExtractorConfig {
                read_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        }
    }

    /// Fake ESP8266: answers the handshake, then streams `tail` and hangs up
    fn spawn_modem(modem: DuplexStream, status: &'static str, tail: &'static [u8]) {
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(modem);
            let mut lines = BufReader::new(read_half).lines();

            while let Ok(Some(command)) = lines.next_line().await {
                let response: &[u8] = match command.trim_end() {
                    "AT+RST" => b"OK\r\n\r\n ets Jan  8 2013,rst cause:2\r\nready\r\n",
                    "AT" => b"AT\r\n\r\nOK\r\n",
                    "AT+CIPSTATUS" => status.as_bytes(),
                    "AT+CWMODE?" => b"+CWMODE:1\r\n\r\nOK\r\n",
                    cmd if cmd.starts_with("AT+CIPSTART") => {
                        write_half.write_all(b"CONNECT\r\n\r\nOK\r\n").await.unwrap();
                        break;
                    }
                    _ => b"ERROR\r\n",
                };
                write_half.write_all(response).await.unwrap();
            }

            // Let the host leave command mode before binary data arrives
            tokio::time::sleep(Duration::from_millis(100)).await;
            write_half.write_all(tail).await.unwrap();
        });
    }

    #[tokio::test]
    async fn test_full_session() {
        let (host, modem) = tokio::io::duplex(4096);
        spawn_modem(
            modem,
            "STATUS:2\r\n\r\nOK\r\n",
            b"noise+IPD,4:\x00\x0b\x00\x0a+IPD,2:\x7e\x00",
        );
        let (read_half, write_half) = tokio::io::split(host);
        let sink = RecordingSink::default();

        let session = Session::new(
            StreamReader::new(read_half),
            StreamWriter(write_half),
            fast_config(),
            Arc::new(sink.clone()),
        );
        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();

        assert!(matches!(result, Err(Gdl90Error::TransportClosed)));
        assert!(sink.lines().iter().any(|l| l == "STATUS:2"));
        assert!(sink.lines().iter().any(|l| l == "CONNECT"));

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].0,
            Message::GeometricAltitude {
                altitude_ft: 50,
                payload: vec![0x00, 0x0b, 0x00, 0x0a],
            }
        );
        assert_eq!(messages[0].1, 5);
        assert!(matches!(messages[1].0, Message::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn test_unconnected_modem_still_reaches_listener() {
        let (host, modem) = tokio::io::duplex(4096);
        spawn_modem(modem, "STATUS:5\r\n\r\nOK\r\n", b"+IPD,4:\x00\x0b\x00\x01");
        let (read_half, write_half) = tokio::io::split(host);
        let sink = RecordingSink::default();

        let session = Session::new(
            StreamReader::new(read_half),
            StreamWriter(write_half),
            fast_config(),
            Arc::new(sink.clone()),
        );
        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();

        assert!(result.is_err());
        let status_lines = sink.lines().iter().filter(|l| *l == "STATUS:5").count();
        assert_eq!(status_lines, 5);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_silent_modem_fails_handshake_and_closes() {
        let (host, modem) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(host);
        let sink = RecordingSink::default();

        let session = Session::new(
            StreamReader::new(read_half),
            StreamWriter(write_half),
            fast_config(),
            Arc::new(sink.clone()),
        );
        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();

        match result {
            Err(Gdl90Error::ProtocolTimeout { command, .. }) => assert_eq!(command, "AT"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(sink.diagnostics().is_empty());

        let mut lines = BufReader::new(modem).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("AT+RST"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("AT"));
        assert!(matches!(lines.next_line().await, Ok(None)));
    }

    #[tokio::test]
    async fn test_drain_is_bounded() {
        let (host, mut modem) = tokio::io::duplex(4096);
        modem
            .write_all(b"Exception (28):\r\nepc1=0x4000\r\nctx: cont\r\nsp: 3ffffd90\r\n")
            .await
            .unwrap();
        let mut reader = StreamReader::new(host);
        let sink = RecordingSink::default();
        let config = SessionConfig {
            read_timeout: Duration::from_millis(20),
            drain_lines: 3,
            ..Default::default()
        };

        drain(&mut reader, &config, &sink).await;

        assert_eq!(
            sink.diagnostics(),
            vec!["Exception (28):", "epc1=0x4000", "ctx: cont"]
        );
    }

    #[tokio::test]
    async fn test_drain_stops_when_quiet() {
        let (host, mut modem) = tokio::io::duplex(4096);
        modem.write_all(b"busy p...\r\n").await.unwrap();
        let mut reader = StreamReader::new(host);
        let sink = RecordingSink::default();
        let config = SessionConfig {
            read_timeout: Duration::from_millis(20),
            ..Default::default()
        };

        tokio::time::timeout(Duration::from_secs(1), drain(&mut reader, &config, &sink))
            .await
            .unwrap();

        assert_eq!(sink.diagnostics(), vec!["busy p..."]);
        drop(modem);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transport() {
        let (host, modem) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(host);

        let session = Session::new(
            StreamReader::new(read_half),
            StreamWriter(write_half),
            fast_config(),
            Arc::new(RecordingSink::default()),
        );
        let result = session
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        assert!(result.is_ok());

        // Host write side is shut down: the modem sees the commands, then EOF
        let mut lines = BufReader::new(modem).lines();
        let mut received = Vec::new();
        loop {
            let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
                .await
                .unwrap()
                .unwrap();
            match line {
                Some(line) => received.push(line),
                None => break,
            }
        }
        assert_eq!(received.first().map(String::as_str), Some("AT+RST"));
    }
}
