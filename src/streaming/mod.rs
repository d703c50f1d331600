// Speech streaming
//
// Consumes speech events from the bus and forwards sentence-sized chunks
// to a synthesis sink.

pub mod dispatcher;
pub mod sink;

pub use dispatcher::{BatchingDispatcher, DispatcherConfig, SpeechDispatcher, TextChunkBuffer};
pub use sink::{ChannelSink, LogSink, SinkError, SynthesisSink};
