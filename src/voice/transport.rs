//! Voice transport interface
//!
//! A transport hands out at most one connection per guild. Connections play
//! one frame stream at a time and report completion through a callback that
//! runs on the transport's own thread.

use crate::audio::frame::BoxedFrameStream;
use crate::error::{StreamError, TransportError};
use crate::protocol::{ChannelId, GuildId};

/// Called once per `play`, with the error that ended the stream if any.
/// Explicit `stop` reports `None`.
pub type CompletionCallback = Box<dyn FnOnce(Option<StreamError>) + Send + 'static>;

/// Handle to a live voice connection.
///
/// Everything except `disconnect` is invoked from the dispatch task and must
/// not block.
pub trait VoiceConnection: Send {
    fn channel(&self) -> ChannelId;

    /// Start playing `stream`. Fails if a stream is already playing.
    fn play(
        &mut self,
        stream: BoxedFrameStream,
        on_complete: CompletionCallback,
    ) -> Result<(), TransportError>;

    /// Signal the current stream to stop. Its callback fires once the stream
    /// is closed; a later `play` emits no audio before that.
    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError>;

    /// Stop and wait for every playback of this connection to finish
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

pub trait VoiceTransport: Send + Sync {
    fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}
