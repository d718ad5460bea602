//! Just-in-time stream opening for resolved media

use std::path::PathBuf;
use std::process::Command;

use crate::audio::frame::BoxedFrameStream;
use crate::audio::process::{pcm_output_args, ProcessStream};
use crate::error::StreamError;

/// Opens a decoded frame stream for a playable locator.
///
/// Blocking: only called from worker threads, right before the item plays.
pub trait StreamSource: Send + Sync {
    fn open_stream(&self, playable_locator: &str) -> Result<BoxedFrameStream, StreamError>;
}

/// Network stream decoded by ffmpeg with transparent reconnects
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    ffmpeg: PathBuf,
    reconnect_delay_max_secs: u32,
}

impl FfmpegSource {
    pub fn new(ffmpeg: impl Into<PathBuf>, reconnect_delay_max_secs: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            reconnect_delay_max_secs,
        }
    }

    fn input_args(&self, locator: &str) -> Vec<String> {
        vec![
            "-reconnect".into(),
            "1".into(),
            "-reconnect_streamed".into(),
            "1".into(),
            "-reconnect_delay_max".into(),
            self.reconnect_delay_max_secs.to_string(),
            "-i".into(),
            locator.into(),
            "-vn".into(),
        ]
    }
}

impl StreamSource for FfmpegSource {
    fn open_stream(&self, playable_locator: &str) -> Result<BoxedFrameStream, StreamError> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(self.input_args(playable_locator))
            .args(pcm_output_args());
        let stream = ProcessStream::spawn(command, playable_locator)?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_args_configure_reconnects() {
        let source = FfmpegSource::new("ffmpeg", 5);
        let args = source.input_args("https://cdn.example/a.webm");
        assert_eq!(
            args,
            vec![
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                "https://cdn.example/a.webm",
                "-vn",
            ]
        );
    }

    #[test]
    fn test_missing_ffmpeg_is_open_error() {
        let source = FfmpegSource::new("/nonexistent/ffmpeg", 5);
        assert!(matches!(
            source.open_stream("https://cdn.example/a.webm"),
            Err(StreamError::Open(_))
        ));
    }
}
