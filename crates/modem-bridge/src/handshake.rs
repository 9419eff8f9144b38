//! Handshake sequencer bringing the modem from reset to an open UDP socket
//!
//! Steps, in order:
//! 1. Reset, then wait for the module to settle
//! 2. Liveness probe
//! 3. Connection status query, retried on a fixed backoff schedule
//! 4. Wireless mode query; station mode is set only if it differs
//! 5. Open the UDP listener

use crate::driver::{CommandResponse, Commander};
use gdl90_core::command::{CWMODE_PREFIX, STATUS_PREFIX, at, status, udp_listen, wifi_mode};
use gdl90_core::{CommandSpec, Result};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for the handshake
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Wait after reset before the first command
    pub settle: Duration,
    /// Timeout for each awaited command
    pub command_timeout: Duration,
    /// Delay before each status query; its length is the attempt budget
    pub status_backoff: Vec<Duration>,
    /// Address of the GDL90 sender
    pub remote_addr: Ipv4Addr,
    /// Port of the GDL90 sender
    pub remote_port: u16,
    /// Local UDP port to listen on
    pub local_port: u16,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            status_backoff: backoff_schedule(Duration::from_secs(1)),
            remote_addr: Ipv4Addr::new(192, 168, 10, 1),
            remote_port: 4000,
            local_port: 4000,
        }
    }
}

/// Status query delays of 0, 1/2, 1, 2 and 4 times `unit`
pub fn backoff_schedule(unit: Duration) -> Vec<Duration> {
    vec![Duration::ZERO, unit / 2, unit, unit * 2, unit * 4]
}

/// What the handshake observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeReport {
    /// Last connection status code seen
    pub status: Option<i64>,
    /// Number of status queries issued
    pub status_attempts: usize,
    /// Wireless mode reported before any change
    pub mode: Option<i64>,
    /// Whether the station mode command was issued
    pub mode_changed: bool,
}

impl HandshakeReport {
    pub fn connected(&self) -> bool {
        self.status == Some(status::GOT_IP)
    }
}

/// Fixed handshake sequence
pub struct Handshake {
    config: HandshakeConfig,
}

impl Handshake {
    pub fn new(config: HandshakeConfig) -> Self {
        Self { config }
    }

    /// Run every step against `commander`
    ///
    /// Only a status query may time out without failing the handshake.
    pub async fn run<C: Commander>(&self, commander: &mut C) -> Result<HandshakeReport> {
        let mut report = HandshakeReport::default();

        info!("Reset");
        commander.send(at::RESET).await?;
        info!("Waiting {:?} for the module to settle", self.config.settle);
        tokio::time::sleep(self.config.settle).await;

        info!("Test");
        self.expect_ok(commander, &CommandSpec::new(at::PING)).await?;

        self.wait_for_connection(commander, &mut report).await?;

        let mode_spec = CommandSpec::new(at::MODE_QUERY).capture(CWMODE_PREFIX);
        let response = self.expect_ok(commander, &mode_spec).await?;
        report.mode = response.values.get(CWMODE_PREFIX);
        if report.mode == Some(wifi_mode::STATION) {
            info!("Already in station mode");
        } else {
            info!("Set station mode (was {:?})", report.mode);
            self.expect_ok(commander, &CommandSpec::new(at::MODE_SET_STATION))
                .await?;
            report.mode_changed = true;
        }

        info!("Listen UDP {}", self.config.local_port);
        let listen = udp_listen(
            self.config.remote_addr,
            self.config.remote_port,
            self.config.local_port,
        );
        self.expect_ok(commander, &CommandSpec::new(listen)).await?;

        Ok(report)
    }

    /// Query connection status until connected or the schedule runs out
    async fn wait_for_connection<C: Commander>(
        &self,
        commander: &mut C,
        report: &mut HandshakeReport,
    ) -> Result<()> {
        let spec = CommandSpec::new(at::STATUS).capture(STATUS_PREFIX);

        for &delay in &self.config.status_backoff {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            report.status_attempts += 1;
            match commander
                .send_and_await(&spec, self.config.command_timeout)
                .await
            {
                Ok(response) => {
                    if let Some(code) = response.values.get(STATUS_PREFIX) {
                        report.status = Some(code);
                    }
                    if report.connected() {
                        info!("Connected after {} status queries", report.status_attempts);
                        return Ok(());
                    }
                    info!("Not connected yet (status {:?})", report.status);
                }
                Err(e @ gdl90_core::Gdl90Error::ProtocolTimeout { .. }) => {
                    warn!("Status query unanswered: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Still not connected after {} status queries, continuing",
            report.status_attempts
        );
        Ok(())
    }

    /// Await a command, warning when the modem answers `ERROR`
    async fn expect_ok<C: Commander>(
        &self,
        commander: &mut C,
        spec: &CommandSpec,
    ) -> Result<CommandResponse> {
        let response = commander
            .send_and_await(spec, self.config.command_timeout)
            .await?;
        if !response.is_ok() {
            warn!("{} answered ERROR, continuing", spec.command);
        }
        Ok(response)
    }
}
