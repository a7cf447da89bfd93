//! Connection sinks.
//!
//! Client sessions are terminated outside this crate (WebSocket, SSE, ...).
//! The registry only needs somewhere to push messages and a way to probe
//! liveness.

use crate::error::SinkError;
use crate::message::OutboundMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Write half of one client session.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn send(&self, message: Arc<OutboundMessage>) -> Result<(), SinkError>;

    /// Liveness probe used by the heartbeat sweep.
    async fn ping(&self) -> Result<(), SinkError>;
}

/// What the session task reads from a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkFrame {
    Message(Arc<OutboundMessage>),
    Ping,
}

/// Bounded-channel sink; the session task owns the receiver and writes
/// frames to the real socket.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkFrame>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn push(&self, frame: SinkFrame) -> Result<(), SinkError> {
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl ConnectionSink for ChannelSink {
    async fn send(&self, message: Arc<OutboundMessage>) -> Result<(), SinkError> {
        self.push(SinkFrame::Message(message)).await
    }

    async fn ping(&self) -> Result<(), SinkError> {
        self.push(SinkFrame::Ping).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_frames() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.ping().await.unwrap();
        assert_eq!(rx.recv().await, Some(SinkFrame::Ping));
    }

    #[tokio::test]
    async fn test_closed_receiver_reports_closed() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        assert_eq!(sink.ping().await, Err(SinkError::Closed));
    }
}
