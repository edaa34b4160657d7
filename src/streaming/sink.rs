//! Transport side of the progress stream.

use crate::error::{Error, Result};
use crate::streaming::channel::SINK_CHANNEL_SIZE;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Destination for encoded frames.
///
/// `send_frame` returns once the frame has been handed to the transport in
/// full. An error means the client is gone.
#[async_trait]
pub trait ProgressSink: Send {
    async fn send_frame(&mut self, frame: Bytes) -> Result<()>;
}

/// Sink backed by a bounded channel, drained by the HTTP response body.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the response body reads from.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(SINK_CHANNEL_SIZE);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::Transport("client disconnected".to_string()))
    }
}
