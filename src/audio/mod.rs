//! Audio subsystem module

pub mod frame;
pub mod process;
pub mod source;

pub use frame::{AudioFrameStream, BoxedFrameStream, Canceller, PcmBufferStream, PcmFrame};
pub use process::{ProcessStream, Transcoder};
pub use source::{FfmpegSource, StreamSource};
