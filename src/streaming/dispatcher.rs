use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::sink::{SinkError, SynthesisSink};
use crate::bus::Subscription;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"));

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Buffered characters beyond which text is sent without a sentence end
    pub flush_threshold: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 100,
        }
    }
}

/// Text received but not yet forwarded
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextChunkBuffer {
    pending: String,
}

impl TextChunkBuffer {
    pub fn append(&mut self, text: &str) {
        self.pending.push_str(text);
        self.pending.push(' ');
    }

    /// First complete sentence and the byte offset just past its boundary
    fn next_sentence(&self) -> Option<(&str, usize)> {
        SENTENCE_END
            .find(&self.pending)
            .map(|m| (self.pending[..m.start() + 1].trim(), m.end()))
    }

    fn consume(&mut self, end: usize) {
        self.pending.drain(..end);
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.trim().chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.trim().is_empty()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Turns speech text into sentence-bounded chunks for a synthesis sink
///
/// Chunks reach the sink in the order their text arrived. When the sink
/// fails, the unsent text stays buffered and goes out with the next
/// `on_text` or `flush`.
pub struct SpeechDispatcher<S> {
    sink: S,
    buffer: TextChunkBuffer,
    config: DispatcherConfig,
}

impl<S: SynthesisSink> SpeechDispatcher<S> {
    pub fn new(sink: S, config: DispatcherConfig) -> Self {
        Self {
            sink,
            buffer: TextChunkBuffer::default(),
            config,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Text still waiting for a sentence boundary
    pub fn pending(&self) -> &str {
        self.buffer.pending()
    }

    pub async fn on_text(&mut self, text: &str) -> Result<(), SinkError> {
        self.buffer.append(text);

        while let Some((sentence, end)) = self.buffer.next_sentence() {
            let sentence = sentence.to_string();
            if !sentence.is_empty() {
                self.forward(sentence).await?;
            }
            self.buffer.consume(end);
        }

        if self.buffer.len() > self.config.flush_threshold {
            tracing::debug!(buffered = self.buffer.len(), "Size threshold reached, flushing");
            self.flush().await?;
        }
        Ok(())
    }

    /// Send whatever is buffered, sentence boundary or not
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            self.buffer.clear();
            return Ok(());
        }

        let chunk = self.buffer.pending().trim().to_string();
        self.forward(chunk).await?;
        self.buffer.clear();
        Ok(())
    }

    async fn forward(&mut self, chunk: String) -> Result<(), SinkError> {
        tracing::debug!(chunk = %chunk, "Forwarding speech chunk");
        self.sink.send(chunk).await.map_err(|e| {
            tracing::warn!(error = %e, "Synthesis sink failed, keeping buffered text");
            e
        })
    }

    /// Feed every speech event from `subscription` until it ends, then flush
    pub async fn run(mut self, mut subscription: Subscription) -> Self {
        tracing::info!(subscription = %subscription.id(), "Speech dispatcher started");

        while let Some(event) = subscription.next_event().await {
            if let Some(text) = event.speech_text() {
                // Failures are logged in `forward`; the text stays buffered.
                let _ = self.on_text(text).await;
            }
        }

        let _ = self.flush().await;
        tracing::info!("Speech dispatcher stopped");
        self
    }
}

/// Speech dispatcher that merges bursts of text before chunking
///
/// Texts arriving within `window` of each other are joined with a space and
/// handed to the inner dispatcher as one.
pub struct BatchingDispatcher<S> {
    inner: SpeechDispatcher<S>,
    window: Duration,
    pending_texts: Vec<String>,
}

impl<S: SynthesisSink> BatchingDispatcher<S> {
    pub fn new(sink: S, config: DispatcherConfig, window: Duration) -> Self {
        Self {
            inner: SpeechDispatcher::new(sink, config),
            window,
            pending_texts: Vec::new(),
        }
    }

    pub fn push(&mut self, text: &str) {
        self.pending_texts.push(text.to_string());
    }

    pub fn batched(&self) -> usize {
        self.pending_texts.len()
    }

    /// Hand the current batch to the inner dispatcher
    pub async fn release(&mut self) -> Result<(), SinkError> {
        if self.pending_texts.is_empty() {
            return Ok(());
        }
        let combined = self.pending_texts.join(" ");
        self.pending_texts.clear();
        tracing::debug!(chars = combined.len(), "Releasing speech batch");
        self.inner.on_text(&combined).await
    }

    pub async fn flush(&mut self) -> Result<(), SinkError> {
        self.release().await?;
        self.inner.flush().await
    }

    pub async fn run(mut self, mut subscription: Subscription) -> SpeechDispatcher<S> {
        tracing::info!(
            subscription = %subscription.id(),
            window_ms = self.window.as_millis() as u64,
            "Batching speech dispatcher started"
        );

        loop {
            let next = if self.pending_texts.is_empty() {
                subscription.next_event().await
            } else {
                match tokio::time::timeout(self.window, subscription.next_event()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let _ = self.release().await;
                        continue;
                    }
                }
            };

            match next {
                Some(event) => {
                    if let Some(text) = event.speech_text() {
                        self.push(text);
                    }
                }
                None => break,
            }
        }

        let _ = self.flush().await;
        tracing::info!("Batching speech dispatcher stopped");
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::events::speech_payload;
    use crate::bus::{BusConfig, CommandBus, EventKind};
    use crate::streaming::sink::ChannelSink;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        chunks: Vec<String>,
        failing: bool,
    }

    #[async_trait]
    impl SynthesisSink for RecordingSink {
        async fn send(&mut self, chunk: String) -> Result<(), SinkError> {
            if self.failing {
                return Err(SinkError::Rejected("synthesizer offline".to_string()));
            }
            self.chunks.push(chunk);
            Ok(())
        }
    }

    fn dispatcher() -> SpeechDispatcher<RecordingSink> {
        SpeechDispatcher::new(RecordingSink::default(), DispatcherConfig::default())
    }

    #[tokio::test]
    async fn test_sentence_chunking() {
        let mut dispatcher = dispatcher();

        dispatcher.on_text("Hello world. How are you").await.unwrap();
        assert_eq!(dispatcher.sink().chunks, vec!["Hello world."]);
        assert_eq!(dispatcher.pending(), "How are you ");

        dispatcher.on_text("today?").await.unwrap();
        assert_eq!(dispatcher.sink().chunks, vec!["Hello world.", "How are you today?"]);
        assert_eq!(dispatcher.pending(), "");
    }

    #[tokio::test]
    async fn test_several_sentences_in_one_call() {
        let mut dispatcher = dispatcher();

        dispatcher.on_text("Sunny! Warm too? Yes. And").await.unwrap();
        assert_eq!(dispatcher.sink().chunks, vec!["Sunny!", "Warm too?", "Yes."]);
        assert_eq!(dispatcher.pending().trim(), "And");
    }

    #[tokio::test]
    async fn test_size_threshold_forces_single_flush() {
        let mut dispatcher = dispatcher();
        let long = "word ".repeat(30);
        let long = long.trim();

        dispatcher.on_text(long).await.unwrap();

        assert_eq!(dispatcher.sink().chunks, vec![long.to_string()]);
        assert_eq!(dispatcher.pending(), "");
    }

    #[tokio::test]
    async fn test_short_text_waits_for_boundary() {
        let mut dispatcher = dispatcher();
        dispatcher.on_text("no punctuation yet").await.unwrap();
        assert!(dispatcher.sink().chunks.is_empty());

        dispatcher.flush().await.unwrap();
        assert_eq!(dispatcher.sink().chunks, vec!["no punctuation yet"]);
        assert_eq!(dispatcher.pending(), "");

        // Nothing buffered, nothing sent.
        dispatcher.flush().await.unwrap();
        assert_eq!(dispatcher.sink().chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_buffer() {
        let mut dispatcher = dispatcher();
        dispatcher.sink_mut().failing = true;

        let result = dispatcher.on_text("Hello world. More").await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
        assert_eq!(dispatcher.pending(), "Hello world. More ");

        dispatcher.sink_mut().failing = false;
        dispatcher.on_text("text.").await.unwrap();
        assert_eq!(dispatcher.sink().chunks, vec!["Hello world.", "More text."]);
    }

    #[tokio::test]
    async fn test_runs_from_bus_and_flushes_on_close() {
        let bus = CommandBus::start(BusConfig::default());
        let (sink, mut rx) = ChannelSink::channel(16);
        let subscription = bus.subscribe();
        let handle = tokio::spawn(SpeechDispatcher::new(sink, DispatcherConfig::default()).run(subscription));

        bus.publish(EventKind::Status, speech_payload("ignored."), None);
        bus.publish(EventKind::Speech, speech_payload("It is sunny. Enjoy"), None);
        bus.publish(EventKind::Speech, speech_payload("the day"), None);

        assert_eq!(rx.recv().await.as_deref(), Some("It is sunny."));

        bus.shutdown();
        let dispatcher = handle.await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("Enjoy the day"));
        assert_eq!(dispatcher.pending(), "");
    }

    #[tokio::test]
    async fn test_batch_release_joins_texts() {
        let mut batching = BatchingDispatcher::new(
            RecordingSink::default(),
            DispatcherConfig::default(),
            Duration::from_millis(500),
        );

        batching.push("Hello");
        batching.push("world.");
        assert_eq!(batching.batched(), 2);

        batching.release().await.unwrap();
        assert_eq!(batching.batched(), 0);
        assert_eq!(batching.inner.sink().chunks, vec!["Hello world."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batching_waits_for_quiet_window() {
        let window = Duration::from_millis(500);
        let bus = CommandBus::start(BusConfig::default());
        let (sink, mut rx) = ChannelSink::channel(16);
        let subscription = bus.subscribe();
        let handle = tokio::spawn(
            BatchingDispatcher::new(sink, DispatcherConfig::default(), window).run(subscription),
        );

        bus.publish(EventKind::Speech, speech_payload("First."), None);
        bus.publish(EventKind::Speech, speech_payload("Second."), None);

        tokio::time::sleep(window / 2).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(window).await;
        assert_eq!(rx.recv().await.as_deref(), Some("First."));
        assert_eq!(rx.recv().await.as_deref(), Some("Second."));

        bus.shutdown();
        handle.await.unwrap();
    }
}
