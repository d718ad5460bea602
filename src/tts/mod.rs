//! Text-to-speech path

pub mod engine;
pub mod pipeline;
pub mod voices;

pub use engine::{GoogleTts, SpeechEngine};
pub use pipeline::{AudioPipeline, SpeechPipeline, Transcode};
pub use voices::{find_voice, Voice, DEFAULT_VOICE, VOICES};
