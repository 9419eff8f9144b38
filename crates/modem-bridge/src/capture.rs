//! Scoped capture of reader output
//!
//! While a [`CaptureGuard`] is alive, every line the reader observes is also
//! queued for the guard's owner. Dropping the guard deactivates capture, so
//! lines read afterwards are never delivered into a stale queue.

use gdl90_core::Line;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Activation slot shared by the reader and the command driver
#[derive(Debug, Default)]
pub struct CaptureSlot {
    sender: Mutex<Option<mpsc::UnboundedSender<Line>>>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Line>>> {
        // The slot holds no invariant a panicking holder could break
        self.sender.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start capturing
    ///
    /// # Panics
    /// Panics if capture is already active; nesting is a programming error.
    pub fn enter(self: &Arc<Self>) -> CaptureGuard {
        let mut slot = self.lock();
        assert!(slot.is_none(), "capture is already active");

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);

        CaptureGuard {
            slot: Arc::clone(self),
            rx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Queue `line` if capture is active
    ///
    /// The slot is consulted on every call, never cached by the caller.
    pub fn forward(&self, line: &Line) {
        if let Some(tx) = self.lock().as_ref() {
            // Receiver lives as long as the guard that installed this sender
            let _ = tx.send(line.clone());
        }
    }
}

/// Active capture; deactivates on drop
#[derive(Debug)]
pub struct CaptureGuard {
    slot: Arc<CaptureSlot>,
    rx: mpsc::UnboundedReceiver<Line>,
}

impl CaptureGuard {
    /// Next captured line
    ///
    /// Cancel safe; pending forever only while no line arrives.
    pub async fn recv(&mut self) -> Option<Line> {
        self.rx.recv().await
    }

    /// Next already-queued line, without waiting
    pub fn try_recv(&mut self) -> Option<Line> {
        self.rx.try_recv().ok()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
