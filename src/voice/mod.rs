//! Voice transport: connections that play frame streams

pub mod local;
pub mod transport;

pub use local::{FileSink, FrameSink, LocalTransport, NullSink};
pub use transport::{CompletionCallback, VoiceConnection, VoiceTransport};
