//! Per-guild playback state
//!
//! Only the coordinator's dispatch task ever touches these values.

use serde::Serialize;
use std::collections::VecDeque;

use crate::protocol::{ChannelId, GuildId};
use crate::resolver::ResolvedItem;
use crate::voice::transport::VoiceConnection;

/// Identifies one playback attempt; callbacks and job results carry it back
pub type Ticket = u64;

/// An entry of the music queue. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub locator: String,
    pub title: String,
}

impl From<ResolvedItem> for QueueItem {
    fn from(item: ResolvedItem) -> Self {
        Self {
            locator: item.locator,
            title: item.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Music { title: String },
    Speech,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    /// Nothing playing
    Idle,
    /// The head item was popped and its stream is being opened on a worker
    Resolving { ticket: Ticket, item: QueueItem },
    Playing { ticket: Ticket, source: PlaybackSource },
}

impl Activity {
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            Activity::Idle => None,
            Activity::Resolving { ticket, .. } | Activity::Playing { ticket, .. } => Some(*ticket),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Activity::Idle)
    }
}

/// Externally visible state of a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No voice connection
    Idle,
    ConnectedIdle,
    Resolving,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildSnapshot {
    pub guild_id: GuildId,
    pub phase: PlaybackPhase,
    pub channel: Option<ChannelId>,
    pub now_playing: Option<String>,
    pub speaking: bool,
    pub queue: Vec<String>,
    pub voice: String,
}

pub struct GuildPlaybackState {
    pub guild_id: GuildId,
    pub connection: Option<Box<dyn VoiceConnection>>,
    pub queue: VecDeque<QueueItem>,
    pub selected_voice: String,
    pub activity: Activity,
}

impl GuildPlaybackState {
    pub fn new(guild_id: GuildId, selected_voice: String) -> Self {
        Self {
            guild_id,
            connection: None,
            queue: VecDeque::new(),
            selected_voice,
            activity: Activity::Idle,
        }
    }

    pub fn enqueue(&mut self, items: impl IntoIterator<Item = QueueItem>) -> usize {
        let before = self.queue.len();
        self.queue.extend(items);
        self.queue.len() - before
    }

    pub fn phase(&self) -> PlaybackPhase {
        match (&self.connection, &self.activity) {
            (None, _) => PlaybackPhase::Idle,
            (Some(_), Activity::Idle) => PlaybackPhase::ConnectedIdle,
            (Some(_), Activity::Resolving { .. }) => PlaybackPhase::Resolving,
            (Some(_), Activity::Playing { .. }) => PlaybackPhase::Playing,
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.queue.iter().map(|item| item.title.clone()).collect()
    }

    pub fn snapshot(&self) -> GuildSnapshot {
        let (now_playing, speaking) = match &self.activity {
            Activity::Playing {
                source: PlaybackSource::Music { title },
                ..
            } => (Some(title.clone()), false),
            Activity::Playing {
                source: PlaybackSource::Speech,
                ..
            } => (None, true),
            _ => (None, false),
        };
        GuildSnapshot {
            guild_id: self.guild_id,
            phase: self.phase(),
            channel: self.connection.as_ref().map(|c| c.channel()),
            now_playing,
            speaking,
            queue: self.titles(),
            voice: self.selected_voice.clone(),
        }
    }
}
