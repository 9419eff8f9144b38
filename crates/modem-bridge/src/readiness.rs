//! Readiness signal shared by the line reader and the command driver
//!
//! The reader sets it when a terminator line arrives; the driver clears it
//! right before writing the next command and waits on it afterwards.

use gdl90_core::{Gdl90Error, Result, Terminator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct State {
    terminator: Option<Terminator>,
    closed: bool,
}

/// Synchronized readiness cell
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<State>>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    /// Create a cell in the ready state (no command in flight)
    pub fn new() -> Self {
        let (tx, _) = watch::channel(State {
            terminator: Some(Terminator::Ok),
            closed: false,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Mark the in-flight command as concluded
    pub fn set(&self, terminator: Terminator) {
        self.tx.send_modify(|state| state.terminator = Some(terminator));
    }

    /// Mark a new command as in flight
    pub fn clear(&self) {
        self.tx.send_modify(|state| state.terminator = None);
    }

    /// Mark the transport as closed; waiters stop waiting
    pub fn close(&self) {
        self.tx.send_modify(|state| state.closed = true);
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().terminator.is_some()
    }

    /// Wait until ready, bounded by `timeout`
    pub async fn wait(&self, timeout: Duration) -> Result<Terminator> {
        self.wait_until(Instant::now() + timeout, timeout).await
    }

    /// Wait until ready or `deadline`
    ///
    /// A terminator observed before the transport closed still counts.
    pub(crate) async fn wait_until(&self, deadline: Instant, timeout: Duration) -> Result<Terminator> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout_at(
            deadline,
            rx.wait_for(|state| state.terminator.is_some() || state.closed),
        )
        .await;

        match waited {
            Err(_) => Err(Gdl90Error::Timeout(timeout)),
            Ok(Err(_)) => Err(Gdl90Error::TransportClosed),
            Ok(Ok(state)) => state.terminator.ok_or(Gdl90Error::TransportClosed),
        }
    }
}
