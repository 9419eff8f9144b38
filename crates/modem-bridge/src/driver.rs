//! Command driver: writes AT commands and waits for their terminator

use crate::capture::CaptureSlot;
use crate::readiness::Readiness;
use crate::transport::ModemWriter;
use async_trait::async_trait;
use gdl90_core::{CapturedValues, CommandSpec, Gdl90Error, Result, Terminator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Outcome of one command exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Terminator that concluded the response
    pub terminator: Terminator,
    /// Values captured for the command's value prefixes
    pub values: CapturedValues,
}

impl CommandResponse {
    pub fn is_ok(&self) -> bool {
        self.terminator == Terminator::Ok
    }
}

/// Trait for issuing commands to the modem
#[async_trait]
pub trait Commander: Send {
    /// Write a command without waiting for its response
    async fn send(&mut self, command: &str) -> Result<()>;

    /// Write a command and wait for its terminator
    ///
    /// Fails with `ProtocolTimeout` if no terminator arrives within `timeout`.
    async fn send_and_await(
        &mut self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResponse>;
}

/// Drives commands over the write half while the line reader runs
pub struct CommandDriver<'a, W: ModemWriter> {
    writer: &'a mut W,
    readiness: Readiness,
    capture: Arc<CaptureSlot>,
}

impl<'a, W: ModemWriter> CommandDriver<'a, W> {
    pub fn new(writer: &'a mut W, readiness: Readiness, capture: Arc<CaptureSlot>) -> Self {
        Self {
            writer,
            readiness,
            capture,
        }
    }

    async fn write_command(&mut self, spec: &CommandSpec) -> Result<()> {
        debug!("-> {}", spec.command);
        self.writer.write(&spec.to_bytes()).await
    }

    /// Drain captured lines until readiness is reached
    async fn await_with_capture(
        &mut self,
        spec: &CommandSpec,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<CommandResponse> {
        let mut guard = self.capture.enter();
        let mut values = CapturedValues::default();

        let scan = |values: &mut CapturedValues, line: gdl90_core::Line| {
            for &prefix in &spec.value_prefixes {
                if let Some(value) = line.value_for(prefix) {
                    trace!("Captured {}{}", prefix, value);
                    values.record(prefix, value);
                }
            }
        };

        self.write_command(spec).await?;

        loop {
            tokio::select! {
                biased;
                line = guard.recv() => match line {
                    Some(line) => scan(&mut values, line),
                    None => return Err(Gdl90Error::Internal("capture channel closed".into())),
                },
                terminator = self.readiness.wait_until(deadline, timeout) => {
                    let terminator = terminator?;
                    // The terminator line is queued before readiness is set
                    while let Some(line) = guard.try_recv() {
                        scan(&mut values, line);
                    }
                    return Ok(CommandResponse { terminator, values });
                }
            }
        }
    }
}

#[async_trait]
impl<'a, W: ModemWriter> Commander for CommandDriver<'a, W> {
    async fn send(&mut self, command: &str) -> Result<()> {
        self.write_command(&CommandSpec::new(command)).await
    }

    async fn send_and_await(
        &mut self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResponse> {
        let deadline = Instant::now() + timeout;
        self.readiness.clear();

        let result = if spec.wants_values() {
            self.await_with_capture(spec, deadline, timeout).await
        } else {
            self.write_command(spec).await?;
            self.readiness
                .wait_until(deadline, timeout)
                .await
                .map(|terminator| CommandResponse {
                    terminator,
                    values: CapturedValues::default(),
                })
        };

        result.map_err(|e| match e {
            Gdl90Error::Timeout(timeout) => Gdl90Error::ProtocolTimeout {
                command: spec.command.clone(),
                timeout,
            },
            other => other,
        })
    }
}
