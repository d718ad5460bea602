//! Per-guild queue and playback state machine

pub mod coordinator;
pub mod state;
pub mod worker;

pub use coordinator::{Coordinator, Enqueued, PlaybackConfig, PlaybackHandle, Services};
pub use state::{GuildSnapshot, PlaybackPhase, QueueItem};
pub use worker::WorkerPool;
