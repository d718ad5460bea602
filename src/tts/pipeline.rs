//! Text to decoded PCM: synthesis followed by one eager transcode
//!
//! Speech output is short and bounded, so the whole encoded buffer goes
//! through the decoder in a single run instead of being frame-streamed.

use bytes::Bytes;
use std::sync::Arc;

use crate::audio::frame::{BoxedFrameStream, PcmBufferStream};
use crate::audio::process::Transcoder;
use crate::error::SynthesisError;
use crate::tts::engine::SpeechEngine;

/// Converts an encoded buffer to s16le/48k/stereo PCM
pub trait Transcode: Send + Sync {
    fn transcode(&self, encoded: &[u8]) -> Result<Bytes, SynthesisError>;
}

impl Transcode for Transcoder {
    fn transcode(&self, encoded: &[u8]) -> Result<Bytes, SynthesisError> {
        Transcoder::transcode(self, encoded)
    }
}

/// Blocking text-to-stream conversion, run on the worker pool
pub trait SpeechPipeline: Send + Sync {
    fn synthesize(&self, text: &str, voice: &str) -> Result<BoxedFrameStream, SynthesisError>;
}

pub struct AudioPipeline {
    engine: Arc<dyn SpeechEngine>,
    transcoder: Arc<dyn Transcode>,
}

impl AudioPipeline {
    pub fn new(engine: Arc<dyn SpeechEngine>, transcoder: Arc<dyn Transcode>) -> Self {
        Self { engine, transcoder }
    }

    /// Same as [`SpeechPipeline::synthesize`] but keeps the concrete stream type
    pub fn render(&self, text: &str, voice: &str) -> Result<PcmBufferStream, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let encoded = self.engine.synthesize(text, voice)?;
        if encoded.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        tracing::info!(voice, encoded_bytes = encoded.len(), "Speech synthesized");

        let pcm = self.transcoder.transcode(&encoded)?;
        if pcm.is_empty() {
            return Err(SynthesisError::Transcode("no PCM produced".into()));
        }

        let stream = PcmBufferStream::new(pcm);
        tracing::debug!(frames = stream.frame_count(), "Speech transcoded");
        Ok(stream)
    }
}

impl SpeechPipeline for AudioPipeline {
    fn synthesize(&self, text: &str, voice: &str) -> Result<BoxedFrameStream, SynthesisError> {
        Ok(Box::new(self.render(text, voice)?))
    }
}
