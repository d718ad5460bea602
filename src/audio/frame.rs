//! PCM frames and the pull-based frame stream capability
//!
//! Every stream handed to a voice connection yields fixed-size frames of
//! signed 16-bit little-endian stereo PCM at 48 kHz.

use bytes::Bytes;
use std::time::Duration;

use crate::constants::{FRAME_BYTES, FRAME_DURATION_MS};
use crate::error::StreamError;

/// One 20 ms chunk of interleaved s16le samples
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmFrame {
    data: Bytes,
}

impl PcmFrame {
    /// Build a frame from at most `FRAME_BYTES` bytes, padding with silence
    pub fn from_chunk(chunk: &[u8]) -> Self {
        debug_assert!(chunk.len() <= FRAME_BYTES);
        if chunk.len() == FRAME_BYTES {
            return Self {
                data: Bytes::copy_from_slice(chunk),
            };
        }
        let mut padded = vec![0u8; FRAME_BYTES];
        padded[..chunk.len()].copy_from_slice(chunk);
        Self {
            data: Bytes::from(padded),
        }
    }

    /// Zero-copy frame over a full-size slice of a larger buffer
    fn from_shared(data: Bytes) -> Self {
        debug_assert_eq!(data.len(), FRAME_BYTES);
        Self { data }
    }

    pub fn silence() -> Self {
        Self {
            data: Bytes::from(vec![0u8; FRAME_BYTES]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn duration() -> Duration {
        Duration::from_millis(FRAME_DURATION_MS)
    }
}

/// Interrupts a stream from another thread so a blocked `read_frame` returns
pub struct Canceller(Box<dyn Fn() + Send + Sync>);

impl Canceller {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Box::new(cancel))
    }

    pub fn cancel(&self) {
        (self.0)()
    }
}

/// Single-consumer producer of PCM frames.
///
/// `read_frame` returns `Ok(None)` once the stream is exhausted. `close`
/// releases every underlying resource and must be safe to call more than
/// once; implementors also close on drop.
pub trait AudioFrameStream: Send {
    fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError>;

    fn close(&mut self);

    /// Handle for streams whose reads can block on external I/O
    fn canceller(&self) -> Option<Canceller> {
        None
    }
}

pub type BoxedFrameStream = Box<dyn AudioFrameStream>;

/// Frame stream over an already decoded PCM buffer (speech output)
pub struct PcmBufferStream {
    pcm: Bytes,
    offset: usize,
    closed: bool,
}

impl PcmBufferStream {
    pub fn new(pcm: Bytes) -> Self {
        Self {
            pcm,
            offset: 0,
            closed: false,
        }
    }

    /// Number of frames the buffer yields, counting a padded tail
    pub fn frame_count(&self) -> usize {
        self.pcm.len().div_ceil(FRAME_BYTES)
    }
}

impl AudioFrameStream for PcmBufferStream {
    fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError> {
        if self.closed || self.offset >= self.pcm.len() {
            return Ok(None);
        }
        let end = (self.offset + FRAME_BYTES).min(self.pcm.len());
        let frame = if end - self.offset == FRAME_BYTES {
            PcmFrame::from_shared(self.pcm.slice(self.offset..end))
        } else {
            PcmFrame::from_chunk(&self.pcm[self.offset..end])
        };
        self.offset = end;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.closed = true;
        self.pcm = Bytes::new();
        self.offset = 0;
    }
}
