//! # Voicebot
//!
//! Voice channel bot: speaks text and plays queued music, one queue per guild.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  Command surface (commands::CommandSurface)  ◄── HTTP (server)           │
//! │     gate check ─► voice channel check ─► defer ─► reply                  │
//! └────────────────────────────────┬─────────────────────────────────────────┘
//!                                  │ PlaybackHandle (mpsc + oneshot)
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │               Dispatch task (playback::Coordinator)                      │
//! │   AccessGate    HashMap<GuildId, GuildPlaybackState>    ticket counter    │
//! │   ┌──────────┐      ┌──────────┐      ┌──────────┐                        │
//! │   │ Guild A  │      │ Guild B  │      │ Guild C  │   queue + activity     │
//! │   └────┬─────┘      └────┬─────┘      └────┬─────┘   + connection         │
//! └────────┼─────────────────┼─────────────────┼─────────────────────────────┘
//!          │ jobs            │                 │            ▲ Events
//!          ▼                 ▼                 ▼            │
//! ┌──────────────────────────────────────────────────┐      │
//! │  WorkerPool (voicebot-worker-N)                   │──────┤ results
//! │   yt-dlp resolve · ffmpeg open · TTS + transcode  │      │
//! └──────────────────────────────────────────────────┘      │
//!                                                            │ on_complete
//! ┌──────────────────────────────────────────────────┐      │
//! │  VoiceTransport (voice::LocalTransport)           │──────┘
//! │   one paced thread per stream, 20 ms PCM frames   │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod resolver;
pub mod server;
pub mod tts;
pub mod voice;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of every PCM frame handed to a voice connection
    pub const PCM_SAMPLE_RATE: u32 = 48000;

    /// Channel count (stereo)
    pub const PCM_CHANNELS: u16 = 2;

    /// Frame length in milliseconds
    pub const FRAME_DURATION_MS: u64 = 20;

    /// 20 ms of s16le stereo at 48 kHz
    pub const FRAME_BYTES: usize =
        (PCM_SAMPLE_RATE as usize / 1000) * FRAME_DURATION_MS as usize * PCM_CHANNELS as usize * 2;

    /// Default HTTP port for the keep-alive and command API
    pub const DEFAULT_PORT: u16 = 8080;

    /// Default worker pool size
    pub const DEFAULT_WORKERS: usize = 4;

    /// Queue entries shown by the queue listing
    pub const MAX_QUEUE_DISPLAY: usize = 10;
}
