use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Synthesis sink is closed")]
    Closed,

    #[error("Synthesis sink rejected chunk: {0}")]
    Rejected(String),
}

/// Downstream consumer of ordered text chunks, e.g. a speech synthesizer
#[async_trait]
pub trait SynthesisSink: Send {
    async fn send(&mut self, chunk: String) -> Result<(), SinkError>;
}

/// Forwards chunks into a channel for another task to synthesize
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end, with room for `capacity` chunks
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl SynthesisSink for ChannelSink {
    async fn send(&mut self, chunk: String) -> Result<(), SinkError> {
        self.tx.send(chunk).await.map_err(|_| SinkError::Closed)
    }
}

/// Logs every chunk; stands in for a synthesizer when none is attached
#[derive(Debug, Default)]
pub struct LogSink {
    sent: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> usize {
        self.sent
    }
}

#[async_trait]
impl SynthesisSink for LogSink {
    async fn send(&mut self, chunk: String) -> Result<(), SinkError> {
        self.sent += 1;
        tracing::info!(chunk = %chunk, seq = self.sent, "Speech chunk ready for synthesis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.send("Hello.".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("Hello."));

        drop(rx);
        assert!(matches!(sink.send("Bye.".to_string()).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_log_sink_counts() {
        let mut sink = LogSink::new();
        sink.send("one".to_string()).await.unwrap();
        sink.send("two".to_string()).await.unwrap();
        assert_eq!(sink.sent(), 2);
    }
}
