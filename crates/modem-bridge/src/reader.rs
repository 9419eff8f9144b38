//! Background line reader used while the modem is in command mode
//!
//! This task:
//! - Drains CR LF terminated lines from the transport
//! - Forwards every line to the event sink
//! - Queues lines for an active scoped capture
//! - Sets the readiness signal on `OK` / `ERROR` lines
//!
//! It runs until its stop flag is raised or the transport closes, then hands
//! the reader back through its join handle.

use crate::capture::CaptureSlot;
use crate::readiness::Readiness;
use crate::sink::EventSink;
use crate::transport::ModemReader;
use gdl90_core::{CRLF, Gdl90Error, Line, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// State shared between the reader task and the command side
#[derive(Clone)]
pub struct ReaderShared {
    pub readiness: Readiness,
    pub capture: Arc<CaptureSlot>,
    pub sink: Arc<dyn EventSink>,
}

/// Background line reader task
///
/// Each read is bounded by `read_timeout`, so the task notices `stop` within
/// one timeout.
pub async fn line_reader_task<R: ModemReader>(
    mut reader: R,
    shared: ReaderShared,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
) -> R {
    while !stop.load(Ordering::SeqCst) {
        if !reader.is_open() {
            debug!("Transport closed, line reader exiting");
            shared.readiness.close();
            break;
        }

        match reader.read_until(CRLF, read_timeout).await {
            Ok(bytes) => {
                let line = Line::decode(&bytes);
                shared.sink.line(&line);
                // Queue before signalling so a woken driver finds the line
                shared.capture.forward(&line);
                if let Some(terminator) = line.terminator() {
                    shared.readiness.set(terminator);
                }
            }
            Err(e) if e.is_transient() => {
                trace!("Line read: {}", e);
            }
            Err(Gdl90Error::TransportClosed) => {
                debug!("Transport closed, line reader exiting");
                shared.readiness.close();
                break;
            }
            Err(e) => {
                error!("Line reader failed: {}", e);
                shared.readiness.close();
                break;
            }
        }
    }

    reader
}

/// Handle to a running line reader
///
/// Dropping the handle raises the stop flag without waiting.
pub struct LineReaderHandle<R: ModemReader> {
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<R>>,
}

impl<R: ModemReader> LineReaderHandle<R> {
    /// Spawn the reader task
    pub fn spawn(reader: R, shared: ReaderShared, read_timeout: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(line_reader_task(
            reader,
            shared,
            Arc::clone(&stop),
            read_timeout,
        ));
        Self {
            stop,
            task: Some(task),
        }
    }

    /// Whether the task has exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop the task and take the reader back
    ///
    /// Waits at most one read timeout.
    pub async fn stop(mut self) -> Result<R> {
        self.stop.store(true, Ordering::SeqCst);
        let task = self
            .task
            .take()
            .ok_or_else(|| Gdl90Error::Internal("line reader already stopped".into()))?;
        task.await
            .map_err(|e| Gdl90Error::Internal(format!("Line reader task failed: {}", e)))
    }
}

impl<R: ModemReader> Drop for LineReaderHandle<R> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
