//! Error types for the voice bot

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dispatcher stopped")]
    Stopped,
}

/// Locator resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("resolver unavailable: {0}")]
    Unavailable(String),

    #[error("resolver failed: {0}")]
    Failed(String),

    #[error("malformed resolver output: {0}")]
    Malformed(String),

    #[error("nothing found for {0}")]
    Empty(String),

    #[error("no playable stream for {0}")]
    NoStream(String),
}

/// Audio frame stream errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("failed to open stream: {0}")]
    Open(String),

    #[error("stream died: {0}")]
    Died(String),

    #[error("read failed: {0}")]
    Read(String),
}

/// Text-to-speech errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("nothing to say")]
    EmptyText,

    #[error("engine returned no audio")]
    EmptyAudio,

    #[error("engine failed: {0}")]
    Engine(String),

    #[error("transcoding failed: {0}")]
    Transcode(String),
}

/// Access gate denials
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionError {
    #[error("access denied")]
    NotAllowed,

    #[error("admin only")]
    AdminOnly,
}

/// Voice transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("playback failed: {0}")]
    Play(String),

    #[error("not connected")]
    NotConnected,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
