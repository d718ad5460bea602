//! The dispatch context: one task owning every guild's playback state
//!
//! Requests, worker results and transport completion callbacks all arrive
//! as [`Event`]s on a single mailbox. The loop handles one event at a time,
//! so mutations of a guild's queue and connection never race and need no
//! per-guild lock. Blocking work goes to the [`WorkerPool`]; workers and
//! transport threads only ever post events back, they never touch state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::access::{AccessGate, Membership};
use crate::audio::frame::BoxedFrameStream;
use crate::audio::source::StreamSource;
use crate::error::{Error, PermissionError, Result, StreamError, TransportError};
use crate::playback::state::{
    Activity, GuildPlaybackState, GuildSnapshot, PlaybackSource, QueueItem, Ticket,
};
use crate::playback::worker::WorkerPool;
use crate::protocol::{ChannelId, GuildId, UserId};
use crate::resolver::{ResolvedSet, Resolver};
use crate::tts::pipeline::SpeechPipeline;
use crate::voice::transport::{CompletionCallback, VoiceTransport};

/// External collaborators the state machine drives
#[derive(Clone)]
pub struct Services {
    pub resolver: Arc<dyn Resolver>,
    pub streams: Arc<dyn StreamSource>,
    pub speech: Arc<dyn SpeechPipeline>,
    pub transport: Arc<dyn VoiceTransport>,
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub workers: usize,
    pub default_voice: String,
}

/// What a `play` request added to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Track { title: String },
    /// Number of usable entries; zero is a valid outcome
    Playlist { count: usize },
}

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Request {
    IsAllowed { user: UserId, reply: Reply<bool> },
    AdminAdd { actor: UserId, user: UserId, reply: Reply<Result<Membership>> },
    AdminRemove { actor: UserId, user: UserId, reply: Reply<Result<Membership>> },
    AdminList { actor: UserId, reply: Reply<std::result::Result<Vec<UserId>, PermissionError>> },
    Play { guild: GuildId, channel: ChannelId, locator: String, reply: Reply<Result<Enqueued>> },
    Say { guild: GuildId, channel: ChannelId, text: String, reply: Reply<Result<()>> },
    SetVoice { guild: GuildId, voice: String, reply: Reply<()> },
    Skip { guild: GuildId, reply: Reply<bool> },
    Stop { guild: GuildId, reply: Reply<bool> },
    Leave { guild: GuildId, reply: Reply<bool> },
    Queue { guild: GuildId, reply: Reply<Vec<String>> },
    Snapshot { guild: GuildId, reply: Reply<Option<GuildSnapshot>> },
}

pub(crate) enum Event {
    Request(Request),
    /// Flat resolution for a `play` request finished
    Resolved {
        guild: GuildId,
        result: std::result::Result<ResolvedSet, crate::error::ResolutionError>,
        reply: Reply<Result<Enqueued>>,
    },
    /// Just-in-time stream opening for a popped queue item finished
    StreamReady {
        guild: GuildId,
        ticket: Ticket,
        item: QueueItem,
        result: Result<BoxedFrameStream>,
    },
    SpeechReady {
        guild: GuildId,
        result: std::result::Result<BoxedFrameStream, crate::error::SynthesisError>,
        reply: Reply<Result<()>>,
    },
    /// Completion callback from the transport thread
    PlaybackFinished {
        guild: GuildId,
        ticket: Ticket,
        error: Option<StreamError>,
    },
    Shutdown { done: Reply<()> },
}

fn post(outbox: &WeakUnboundedSender<Event>, event: Event) {
    match outbox.upgrade() {
        Some(tx) => {
            let _ = tx.send(event);
        }
        None => tracing::debug!("Dispatcher gone, dropping event"),
    }
}

/// Resolve the direct stream of a queue item and open it. Runs on a worker.
fn open_item(
    resolver: &dyn Resolver,
    streams: &dyn StreamSource,
    item: &QueueItem,
) -> Result<BoxedFrameStream> {
    let resolved = resolver.resolve(&item.locator, false)?;
    let playable = resolved
        .into_items()
        .into_iter()
        .next()
        .ok_or_else(|| crate::error::ResolutionError::Empty(item.locator.clone()))?;
    Ok(streams.open_stream(&playable.locator)?)
}

/// Cloneable front door to the dispatch task
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: UnboundedSender<Event>,
}

impl PlaybackHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Request(build(reply)))
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)
    }

    pub async fn is_allowed(&self, user: UserId) -> Result<bool> {
        self.request(|reply| Request::IsAllowed { user, reply }).await
    }

    pub async fn admin_add(&self, actor: UserId, user: UserId) -> Result<Membership> {
        self.request(|reply| Request::AdminAdd { actor, user, reply }).await?
    }

    pub async fn admin_remove(&self, actor: UserId, user: UserId) -> Result<Membership> {
        self.request(|reply| Request::AdminRemove { actor, user, reply }).await?
    }

    pub async fn admin_list(&self, actor: UserId) -> Result<Vec<UserId>> {
        Ok(self.request(|reply| Request::AdminList { actor, reply }).await??)
    }

    /// Connect, resolve `locator` without resolving streams, enqueue, and
    /// start playback if the guild is idle
    pub async fn play(&self, guild: GuildId, channel: ChannelId, locator: String) -> Result<Enqueued> {
        self.request(|reply| Request::Play { guild, channel, locator, reply }).await?
    }

    /// Connect and speak `text`, interrupting any music
    pub async fn say(&self, guild: GuildId, channel: ChannelId, text: String) -> Result<()> {
        self.request(|reply| Request::Say { guild, channel, text, reply }).await?
    }

    pub async fn set_voice(&self, guild: GuildId, voice: String) -> Result<()> {
        self.request(|reply| Request::SetVoice { guild, voice, reply }).await
    }

    /// Returns false when nothing was playing
    pub async fn skip(&self, guild: GuildId) -> Result<bool> {
        self.request(|reply| Request::Skip { guild, reply }).await
    }

    /// Clears the queue; returns whether a track was playing or being opened
    pub async fn stop(&self, guild: GuildId) -> Result<bool> {
        self.request(|reply| Request::Stop { guild, reply }).await
    }

    /// Returns false when the bot was not connected
    pub async fn leave(&self, guild: GuildId) -> Result<bool> {
        self.request(|reply| Request::Leave { guild, reply }).await
    }

    pub async fn queue(&self, guild: GuildId) -> Result<Vec<String>> {
        self.request(|reply| Request::Queue { guild, reply }).await
    }

    pub async fn snapshot(&self, guild: GuildId) -> Result<Option<GuildSnapshot>> {
        self.request(|reply| Request::Snapshot { guild, reply }).await
    }

    /// Stop every guild and end the dispatch loop
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Event::Shutdown { done })
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)
    }
}

pub struct Coordinator {
    services: Services,
    gate: AccessGate,
    default_voice: String,
    guilds: HashMap<GuildId, GuildPlaybackState>,
    pool: WorkerPool,
    mailbox: UnboundedReceiver<Event>,
    outbox: WeakUnboundedSender<Event>,
    next_ticket: Ticket,
}

impl Coordinator {
    pub fn new(
        services: Services,
        gate: AccessGate,
        config: PlaybackConfig,
    ) -> std::io::Result<(Self, PlaybackHandle)> {
        let pool = WorkerPool::new(config.workers)?;
        let (tx, mailbox) = mpsc::unbounded_channel();
        let coordinator = Self {
            services,
            gate,
            default_voice: config.default_voice,
            guilds: HashMap::new(),
            pool,
            mailbox,
            outbox: tx.downgrade(),
            next_ticket: 0,
        };
        Ok((coordinator, PlaybackHandle { tx }))
    }

    /// Start the dispatch loop on the current runtime
    pub fn spawn(
        services: Services,
        gate: AccessGate,
        config: PlaybackConfig,
    ) -> std::io::Result<(PlaybackHandle, JoinHandle<()>)> {
        let (coordinator, handle) = Self::new(services, gate, config)?;
        let task = tokio::spawn(coordinator.run());
        Ok((handle, task))
    }

    pub async fn run(mut self) {
        tracing::info!(workers = self.pool.size(), "Dispatcher started");
        let mut done = None;
        while let Some(event) = self.mailbox.recv().await {
            done = self.handle(event);
            if done.is_some() {
                break;
            }
        }
        self.release_all();
        // Dropping the pool drains queued disconnects and may wait on a
        // running resolver process
        let Coordinator { pool, .. } = self;
        let _ = tokio::task::spawn_blocking(move || drop(pool)).await;
        if let Some(done) = done {
            let _ = done.send(());
        }
        tracing::info!("Dispatcher stopped");
    }

    /// Returns the shutdown acknowledgement when the loop should end
    fn handle(&mut self, event: Event) -> Option<Reply<()>> {
        match event {
            Event::Request(request) => self.handle_request(request),
            Event::Resolved { guild, result, reply } => self.on_resolved(guild, result, reply),
            Event::StreamReady { guild, ticket, item, result } => {
                self.on_stream_ready(guild, ticket, item, result)
            }
            Event::SpeechReady { guild, result, reply } => self.on_speech_ready(guild, result, reply),
            Event::PlaybackFinished { guild, ticket, error } => {
                self.on_playback_finished(guild, ticket, error)
            }
            Event::Shutdown { done } => return Some(done),
        }
        None
    }

    fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if !self.pool.execute(job) {
            tracing::error!("Worker pool closed, job dropped");
        }
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::IsAllowed { user, reply } => {
                let _ = reply.send(self.gate.is_allowed(user));
            }
            Request::AdminAdd { actor, user, reply } => {
                let _ = reply.send(self.gate.add(actor, user));
            }
            Request::AdminRemove { actor, user, reply } => {
                let _ = reply.send(self.gate.remove(actor, user));
            }
            Request::AdminList { actor, reply } => {
                let _ = reply.send(self.gate.list(actor));
            }
            Request::Play { guild, channel, locator, reply } => {
                self.request_play(guild, channel, locator, reply)
            }
            Request::Say { guild, channel, text, reply } => self.request_say(guild, channel, text, reply),
            Request::SetVoice { guild, voice, reply } => {
                tracing::info!(guild = %guild, voice = %voice, "Voice selected");
                self.state(guild).selected_voice = voice;
                let _ = reply.send(());
            }
            Request::Skip { guild, reply } => {
                let _ = reply.send(self.skip(guild));
            }
            Request::Stop { guild, reply } => {
                let _ = reply.send(self.stop(guild));
            }
            Request::Leave { guild, reply } => {
                let _ = reply.send(self.leave(guild));
            }
            Request::Queue { guild, reply } => {
                let titles = self.guilds.get(&guild).map(|s| s.titles()).unwrap_or_default();
                let _ = reply.send(titles);
            }
            Request::Snapshot { guild, reply } => {
                let _ = reply.send(self.guilds.get(&guild).map(|s| s.snapshot()));
            }
        }
    }

    /// Lazily create the guild's state
    fn state(&mut self, guild: GuildId) -> &mut GuildPlaybackState {
        let voice = &self.default_voice;
        self.guilds
            .entry(guild)
            .or_insert_with(|| GuildPlaybackState::new(guild, voice.clone()))
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn completion(&self, guild: GuildId, ticket: Ticket) -> CompletionCallback {
        let outbox = self.outbox.clone();
        Box::new(move |error| post(&outbox, Event::PlaybackFinished { guild, ticket, error }))
    }

    /// Acquire, move or keep the guild's voice connection
    fn connect(&mut self, guild: GuildId, channel: ChannelId) -> std::result::Result<(), TransportError> {
        let transport = Arc::clone(&self.services.transport);
        let state = self.state(guild);
        if let Some(conn) = state.connection.as_mut() {
            if conn.channel() != channel {
                conn.move_to(channel)?;
            }
            return Ok(());
        }
        state.connection = Some(transport.connect(guild, channel)?);
        Ok(())
    }

    fn request_play(
        &mut self,
        guild: GuildId,
        channel: ChannelId,
        locator: String,
        reply: Reply<Result<Enqueued>>,
    ) {
        if let Err(e) = self.connect(guild, channel) {
            let _ = reply.send(Err(e.into()));
            return;
        }
        let resolver = Arc::clone(&self.services.resolver);
        let outbox = self.outbox.clone();
        self.submit(move || {
            let result = resolver.resolve(&locator, true);
            post(&outbox, Event::Resolved { guild, result, reply });
        });
    }

    fn on_resolved(
        &mut self,
        guild: GuildId,
        result: std::result::Result<ResolvedSet, crate::error::ResolutionError>,
        reply: Reply<Result<Enqueued>>,
    ) {
        let set = match result {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "Resolution failed");
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let state = self.state(guild);
        let outcome = match set {
            ResolvedSet::Single(item) => {
                let title = item.title.clone();
                state.enqueue([QueueItem::from(item)]);
                Enqueued::Track { title }
            }
            ResolvedSet::Playlist(items) => {
                let count = state.enqueue(items.into_iter().map(QueueItem::from));
                Enqueued::Playlist { count }
            }
        };
        tracing::info!(guild = %guild, queued = state.queue.len(), "Queue extended");
        let _ = reply.send(Ok(outcome));
        self.play_next(guild);
    }

    /// Start the head of the queue if the guild is connected and idle
    fn play_next(&mut self, guild: GuildId) {
        let Some(state) = self.guilds.get_mut(&guild) else {
            return;
        };
        if !state.activity.is_idle() {
            return;
        }
        match state.connection.as_ref() {
            Some(conn) if !conn.is_playing() => {}
            _ => return,
        }
        let Some(item) = state.queue.pop_front() else {
            tracing::debug!(guild = %guild, "Queue drained");
            return;
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        tracing::info!(guild = %guild, title = %item.title, ticket, "Resolving stream");
        state.activity = Activity::Resolving {
            ticket,
            item: item.clone(),
        };

        let resolver = Arc::clone(&self.services.resolver);
        let streams = Arc::clone(&self.services.streams);
        let outbox = self.outbox.clone();
        self.submit(move || {
            let result = open_item(resolver.as_ref(), streams.as_ref(), &item);
            post(&outbox, Event::StreamReady { guild, ticket, item, result });
        });
    }

    fn on_stream_ready(
        &mut self,
        guild: GuildId,
        ticket: Ticket,
        item: QueueItem,
        result: Result<BoxedFrameStream>,
    ) {
        let on_complete = self.completion(guild, ticket);
        let Some(state) = self.guilds.get_mut(&guild) else {
            return;
        };
        if state.activity.ticket() != Some(ticket) {
            // Superseded by stop, leave or speech; dropping the stream closes it
            tracing::debug!(guild = %guild, ticket, "Discarding stale stream");
            return;
        }

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(guild = %guild, title = %item.title, error = %e, "Skipping unplayable track");
                state.activity = Activity::Idle;
                self.play_next(guild);
                return;
            }
        };

        let Some(conn) = state.connection.as_mut() else {
            state.activity = Activity::Idle;
            return;
        };
        if conn.is_playing() {
            conn.stop();
        }
        match conn.play(stream, on_complete) {
            Ok(()) => {
                tracing::info!(guild = %guild, title = %item.title, ticket, "Now playing");
                state.activity = Activity::Playing {
                    ticket,
                    source: PlaybackSource::Music { title: item.title },
                };
            }
            Err(e) => {
                tracing::warn!(guild = %guild, title = %item.title, error = %e, "Transport refused track");
                state.activity = Activity::Idle;
                self.play_next(guild);
            }
        }
    }

    fn request_say(&mut self, guild: GuildId, channel: ChannelId, text: String, reply: Reply<Result<()>>) {
        if let Err(e) = self.connect(guild, channel) {
            let _ = reply.send(Err(e.into()));
            return;
        }
        let voice = self.state(guild).selected_voice.clone();
        let speech = Arc::clone(&self.services.speech);
        let outbox = self.outbox.clone();
        self.submit(move || {
            let result = speech.synthesize(&text, &voice);
            post(&outbox, Event::SpeechReady { guild, result, reply });
        });
    }

    fn on_speech_ready(
        &mut self,
        guild: GuildId,
        result: std::result::Result<BoxedFrameStream, crate::error::SynthesisError>,
        reply: Reply<Result<()>>,
    ) {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "Speech synthesis failed");
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let ticket = self.issue_ticket();
        let on_complete = self.completion(guild, ticket);
        let Some(state) = self.guilds.get_mut(&guild) else {
            let _ = reply.send(Err(TransportError::NotConnected.into()));
            return;
        };
        let Some(conn) = state.connection.as_mut() else {
            let _ = reply.send(Err(TransportError::NotConnected.into()));
            return;
        };

        // Speech interrupts music; a track still being opened goes back to the front
        match std::mem::replace(&mut state.activity, Activity::Idle) {
            Activity::Resolving { item, .. } => state.queue.push_front(item),
            Activity::Playing { .. } | Activity::Idle => {}
        }
        if conn.is_playing() {
            conn.stop();
        }

        match conn.play(stream, on_complete) {
            Ok(()) => {
                tracing::info!(guild = %guild, ticket, "Speaking");
                state.activity = Activity::Playing {
                    ticket,
                    source: PlaybackSource::Speech,
                };
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                self.play_next(guild);
            }
        }
    }

    fn on_playback_finished(&mut self, guild: GuildId, ticket: Ticket, error: Option<StreamError>) {
        let Some(state) = self.guilds.get_mut(&guild) else {
            return;
        };
        let current = matches!(state.activity, Activity::Playing { ticket: t, .. } if t == ticket);
        if !current {
            tracing::debug!(guild = %guild, ticket, "Ignoring stale completion");
            return;
        }
        if let Some(e) = error {
            tracing::warn!(guild = %guild, ticket, error = %e, "Playback ended with error");
        }
        state.activity = Activity::Idle;
        self.play_next(guild);
    }

    fn skip(&mut self, guild: GuildId) -> bool {
        let Some(state) = self.guilds.get_mut(&guild) else {
            return false;
        };
        if !matches!(state.activity, Activity::Playing { .. }) {
            return false;
        }
        match state.connection.as_mut() {
            // The completion callback drives the next transition
            Some(conn) => {
                conn.stop();
                true
            }
            None => false,
        }
    }

    fn stop(&mut self, guild: GuildId) -> bool {
        let Some(state) = self.guilds.get_mut(&guild) else {
            return false;
        };
        state.queue.clear();
        let was_playing = !state.activity.is_idle();
        state.activity = Activity::Idle;
        if let Some(conn) = state.connection.as_mut() {
            conn.stop();
        }
        tracing::info!(guild = %guild, "Stopped and cleared queue");
        was_playing
    }

    fn leave(&mut self, guild: GuildId) -> bool {
        let Some(state) = self.guilds.get_mut(&guild) else {
            return false;
        };
        state.queue.clear();
        state.activity = Activity::Idle;
        let Some(mut conn) = state.connection.take() else {
            return false;
        };
        conn.stop();
        // Disconnecting joins the playback thread
        self.submit(move || {
            if let Err(e) = conn.disconnect() {
                tracing::warn!(guild = %guild, error = %e, "Disconnect failed");
            }
        });
        true
    }

    fn release_all(&mut self) {
        let guilds: Vec<GuildId> = self.guilds.keys().copied().collect();
        for guild in guilds {
            self.leave(guild);
        }
        self.guilds.clear();
    }
}
