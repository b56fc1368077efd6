//! Streaming response sinks.
//!
//! The relay writes protocol bytes to a [`ResponseSink`]; implementations
//! bridge to the transport. Writes are ordered and irreversible — once a
//! chunk is accepted it is on its way to the client.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("response sink closed by peer")]
    Closed,
    #[error("response sink io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered byte sink for one invocation's response.
#[async_trait]
pub trait ResponseSink: Send {
    /// Write one chunk. Chunks are delivered in call order.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Close the sink. Closing an already-closed sink is a no-op.
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Sink backed by an mpsc channel; the receiver side becomes the HTTP
/// response body stream.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl ChannelSink {
    /// Sink plus the receiver to turn into a response body. The channel is
    /// bounded, so a slow reader suspends the relay instead of buffering the
    /// whole response.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        tx.send(Bytes::copy_from_slice(bytes))
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.tx.take();
        Ok(())
    }
}

/// Sink that writes to stdout, flushing per chunk (CLI one-shot mode).
pub struct StdoutSink {
    out: tokio::io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseSink for StdoutSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.out.write_all(bytes).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.out.flush().await?;
        Ok(())
    }
}
