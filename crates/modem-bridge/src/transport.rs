//! Transport abstractions for the modem link
//!
//! Provides ModemReader/ModemWriter traits so the serial port can be split
//! into a read half (owned by the line reader, then the frame extractor) and
//! a write half (owned by the command driver).

use async_trait::async_trait;
use gdl90_core::{Gdl90Error, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};

/// Longest undelimited run returned as one chunk by `read_until`
pub const MAX_LINE_LEN: usize = 4096;

/// Trait for reading from the modem
#[async_trait]
pub trait ModemReader: Send + 'static {
    /// Read up to and including `delimiter`
    ///
    /// Returns `Timeout` if no delimiter arrived in time; bytes read so far
    /// are kept for the next call.
    async fn read_until(&mut self, delimiter: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Read exactly `n` bytes
    ///
    /// Returns `Timeout` if fewer arrived in time; bytes read so far are kept
    /// for the next call.
    async fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Whether the stream has not reached end of file
    fn is_open(&self) -> bool;
}

/// Trait for writing to the modem
#[async_trait]
pub trait ModemWriter: Send {
    /// Write all bytes and flush
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Shut down the write side
    async fn close(&mut self) -> Result<()>;
}

/// Buffered, timeout-bounded reader over any tokio byte stream
pub struct StreamReader<R> {
    inner: R,
    pending: Vec<u8>,
    open: bool,
}

impl<R: AsyncRead + Unpin + Send + 'static> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            open: true,
        }
    }

    /// Pull more bytes into `pending`
    async fn fill(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        if !self.open {
            return Err(Gdl90Error::TransportClosed);
        }
        // read_buf is cancel safe, so a timeout never loses bytes
        match timeout_at(deadline, self.inner.read_buf(&mut self.pending)).await {
            Err(_) => Err(Gdl90Error::Timeout(timeout)),
            Ok(Ok(0)) => {
                self.open = false;
                Err(Gdl90Error::TransportClosed)
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> ModemReader for StreamReader<R> {
    async fn read_until(&mut self, delimiter: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if delimiter.is_empty() {
            return Err(Gdl90Error::Internal("empty delimiter".into()));
        }
        let deadline = Instant::now() + timeout;
        let mut searched: usize = 0;

        loop {
            // Resume the search where the last one stopped, allowing for a
            // delimiter split across reads
            let start = searched.saturating_sub(delimiter.len() - 1);
            if let Some(pos) = self.pending[start..]
                .windows(delimiter.len())
                .position(|w| w == delimiter)
            {
                let end = start + pos + delimiter.len();
                return Ok(self.pending.drain(..end).collect());
            }
            if self.pending.len() >= MAX_LINE_LEN {
                return Ok(std::mem::take(&mut self.pending));
            }
            searched = self.pending.len();

            if let Err(e) = self.fill(deadline, timeout).await {
                // Hand out the unterminated tail before reporting the close
                if matches!(e, Gdl90Error::TransportClosed) && !self.pending.is_empty() {
                    return Ok(std::mem::take(&mut self.pending));
                }
                return Err(e);
            }
        }
    }

    async fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < n {
            self.fill(deadline, timeout).await?;
        }
        Ok(self.pending.drain(..n).collect())
    }

    fn is_open(&self) -> bool {
        self.open || !self.pending.is_empty()
    }
}

/// Writer over any tokio byte stream
pub struct StreamWriter<W>(pub W);

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ModemWriter for StreamWriter<W> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.0
            .write_all(data)
            .await
            .map_err(|e| Gdl90Error::Transport(format!("Write failed: {}", e)))?;
        self.0
            .flush()
            .await
            .map_err(|e| Gdl90Error::Transport(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .shutdown()
            .await
            .map_err(|e| Gdl90Error::Transport(format!("Shutdown failed: {}", e)))
    }
}
