//! ffmpeg child processes: streaming decode and one-shot transcoding

use bytes::Bytes;
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;

use crate::audio::frame::{AudioFrameStream, Canceller, PcmFrame};
use crate::constants::{FRAME_BYTES, PCM_CHANNELS, PCM_SAMPLE_RATE};
use crate::error::{StreamError, SynthesisError};

/// Output arguments shared by every decode stage: raw s16le, 48 kHz, stereo
pub fn pcm_output_args() -> Vec<String> {
    vec![
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        PCM_SAMPLE_RATE.to_string(),
        "-ac".into(),
        PCM_CHANNELS.to_string(),
        "-loglevel".into(),
        "quiet".into(),
        "pipe:1".into(),
    ]
}

/// Frame stream reading decoded PCM from a child process' stdout
pub struct ProcessStream {
    label: String,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
}

impl ProcessStream {
    /// Spawn `command` with stdout piped and wrap it
    pub fn spawn(mut command: Command, label: impl Into<String>) -> Result<Self, StreamError> {
        let label = label.into();
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StreamError::Open(format!("{}: {}", label, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::Open(format!("{}: stdout not captured", label)))?;

        tracing::debug!(stream = %label, pid = child.id(), "Decoder process started");

        Ok(Self {
            label,
            child: Arc::new(Mutex::new(Some(child))),
            stdout: Some(stdout),
        })
    }

    /// Fill `buf` as far as the pipe allows; returns bytes read
    fn fill(stdout: &mut ChildStdout, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Reap the child once its output is drained
    fn finish(&mut self) -> Result<(), StreamError> {
        self.stdout = None;
        let Some(mut child) = self.child.lock().take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| StreamError::Read(format!("{}: {}", self.label, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(StreamError::Died(format!("{}: decoder exited with {}", self.label, status)))
        }
    }
}

impl AudioFrameStream for ProcessStream {
    fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = [0u8; FRAME_BYTES];
        let filled = Self::fill(stdout, &mut buf)
            .map_err(|e| StreamError::Read(format!("{}: {}", self.label, e)))?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        Ok(Some(PcmFrame::from_chunk(&buf[..filled])))
    }

    fn close(&mut self) {
        self.stdout = None;
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(stream = %self.label, "Decoder process terminated");
        }
    }

    fn canceller(&self) -> Option<Canceller> {
        let child = Arc::clone(&self.child);
        Some(Canceller::new(move || {
            // Killing closes the pipe; the reader sees EOF and reaps the child
            if let Some(child) = child.lock().as_mut() {
                let _ = child.kill();
            }
        }))
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// One-shot encoded-to-PCM conversion of a complete in-memory buffer
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Decode `encoded` to s16le/48k/stereo in a single ffmpeg run
    pub fn transcode(&self, encoded: &[u8]) -> Result<Bytes, SynthesisError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-i", "pipe:0"])
            .args(pcm_output_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SynthesisError::Transcode(format!("{}: {}", self.ffmpeg.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Transcode("stdin not captured".into()))?;

        // stdin is fed from a helper thread so a full stdout pipe cannot deadlock us
        let input = encoded.to_vec();
        let writer = thread::Builder::new()
            .name("transcode-stdin".into())
            .spawn(move || {
                let result = stdin.write_all(&input);
                drop(stdin);
                result
            })
            .map_err(|e| SynthesisError::Transcode(e.to_string()))?;

        let output = child
            .wait_with_output()
            .map_err(|e| SynthesisError::Transcode(e.to_string()))?;

        match writer.join() {
            Ok(Ok(())) => {}
            // ffmpeg may stop reading early on bad input; the exit status reports it
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(SynthesisError::Transcode(e.to_string())),
            Err(_) => return Err(SynthesisError::Transcode("stdin writer panicked".into())),
        }

        if !output.status.success() {
            return Err(SynthesisError::Transcode(format!(
                "ffmpeg exited with {}",
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(SynthesisError::Transcode("no PCM produced".into()));
        }
        Ok(Bytes::from(output.stdout))
    }
}
