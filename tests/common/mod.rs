//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use voicebot::access::{AccessGate, AllowListStore};
use voicebot::audio::{AudioFrameStream, BoxedFrameStream, PcmBufferStream, PcmFrame};
use voicebot::constants::FRAME_BYTES;
use voicebot::error::{ResolutionError, StreamError, SynthesisError};
use voicebot::playback::{
    Coordinator, GuildSnapshot, PlaybackConfig, PlaybackHandle, Services,
};
use voicebot::protocol::{GuildId, UserId};
use voicebot::resolver::{ResolvedItem, ResolvedSet, Resolver};
use voicebot::tts::SpeechPipeline;
use voicebot::voice::{LocalTransport, NullSink};

pub const ADMIN: UserId = UserId(1);
pub const GUILD: GuildId = GuildId(100);

/// `playlist:a,b,c` resolves to a playlist, anything else to a single track.
/// Locators listed in `broken` fail their stream resolution.
#[derive(Default)]
pub struct FakeResolver {
    pub broken: HashSet<String>,
}

impl Resolver for FakeResolver {
    fn resolve(&self, locator: &str, flat: bool) -> Result<ResolvedSet, ResolutionError> {
        if locator == "unreachable" {
            return Err(ResolutionError::Failed("HTTP Error 404".into()));
        }
        if flat {
            if let Some(list) = locator.strip_prefix("playlist:") {
                let items = list
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| ResolvedItem {
                        title: s.to_string(),
                        locator: s.to_string(),
                    })
                    .collect();
                return Ok(ResolvedSet::Playlist(items));
            }
            return Ok(ResolvedSet::Single(ResolvedItem {
                title: locator.to_string(),
                locator: locator.to_string(),
            }));
        }
        if self.broken.contains(locator) {
            return Err(ResolutionError::NoStream(locator.to_string()));
        }
        Ok(ResolvedSet::Single(ResolvedItem {
            title: locator.to_string(),
            locator: format!("stream:{}", locator),
        }))
    }
}

/// Open order plus counters. A stream is open from creation until closed,
/// and playing from its first read until closed.
#[derive(Default)]
pub struct StreamLedger {
    pub opened: Mutex<Vec<String>>,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    playing_now: AtomicUsize,
    max_playing: AtomicUsize,
}

impl StreamLedger {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn max_playing(&self) -> usize {
        self.max_playing.load(Ordering::SeqCst)
    }

    fn track(self: &Arc<Self>, label: &str, inner: BoxedFrameStream) -> BoxedFrameStream {
        self.opened.lock().push(label.to_string());
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        Box::new(TrackedStream {
            inner,
            ledger: Arc::clone(self),
            started: false,
            closed: false,
        })
    }
}

struct TrackedStream {
    inner: BoxedFrameStream,
    ledger: Arc<StreamLedger>,
    started: bool,
    closed: bool,
}

impl AudioFrameStream for TrackedStream {
    fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError> {
        if !self.started {
            self.started = true;
            let now = self.ledger.playing_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.ledger.max_playing.fetch_max(now, Ordering::SeqCst);
        }
        self.inner.read_frame()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
            self.ledger.open_now.fetch_sub(1, Ordering::SeqCst);
            if self.started {
                self.ledger.playing_now.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fails after one frame
struct DyingStream {
    served: bool,
}

impl AudioFrameStream for DyingStream {
    fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError> {
        if self.served {
            return Err(StreamError::Died("connection reset".into()));
        }
        self.served = true;
        Ok(Some(PcmFrame::silence()))
    }

    fn close(&mut self) {}
}

pub fn pcm(frames: usize) -> BoxedFrameStream {
    Box::new(PcmBufferStream::new(Bytes::from(vec![0u8; frames * FRAME_BYTES])))
}

/// Music streams of `frames` frames, each taking `delay` to open;
/// `stream:dying*` locators error mid-stream
pub struct FakeStreams {
    pub frames: usize,
    pub delay: Duration,
    pub ledger: Arc<StreamLedger>,
}

impl voicebot::audio::StreamSource for FakeStreams {
    fn open_stream(&self, locator: &str) -> Result<BoxedFrameStream, StreamError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let label = locator.strip_prefix("stream:").unwrap_or(locator);
        let inner: BoxedFrameStream = if label.starts_with("dying") {
            Box::new(DyingStream { served: false })
        } else {
            pcm(self.frames)
        };
        Ok(self.ledger.track(label, inner))
    }
}

pub struct FakeSpeech {
    pub frames: usize,
    pub ledger: Arc<StreamLedger>,
    pub voices: Mutex<Vec<String>>,
}

impl SpeechPipeline for FakeSpeech {
    fn synthesize(&self, text: &str, voice: &str) -> Result<BoxedFrameStream, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        self.voices.lock().push(voice.to_string());
        Ok(self.ledger.track("speech", pcm(self.frames)))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    pub users: Arc<Mutex<BTreeSet<UserId>>>,
}

impl AllowListStore for MemoryStore {
    fn load(&self) -> BTreeSet<UserId> {
        self.users.lock().clone()
    }

    fn save(&self, users: &BTreeSet<UserId>) -> io::Result<()> {
        *self.users.lock() = users.clone();
        Ok(())
    }
}

pub struct Harness {
    pub playback: PlaybackHandle,
    pub ledger: Arc<StreamLedger>,
    pub speech: Arc<FakeSpeech>,
}

pub struct HarnessBuilder {
    broken: HashSet<String>,
    music_frames: usize,
    speech_frames: usize,
    realtime: bool,
    open_delay: Duration,
    store: Box<dyn AllowListStore>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            broken: HashSet::new(),
            music_frames: 3,
            speech_frames: 3,
            realtime: false,
            open_delay: Duration::ZERO,
            store: Box::new(MemoryStore::default()),
        }
    }

    pub fn broken(mut self, locator: &str) -> Self {
        self.broken.insert(locator.to_string());
        self
    }

    /// Paced playback with music long enough to be interrupted
    pub fn long_music(mut self) -> Self {
        self.music_frames = 500;
        self.speech_frames = 25;
        self.realtime = true;
        self
    }

    pub fn music_frames(mut self, frames: usize) -> Self {
        self.music_frames = frames;
        self
    }

    /// Every music stream takes `delay` to open
    pub fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn store(mut self, store: Box<dyn AllowListStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Harness {
        let ledger = Arc::new(StreamLedger::default());
        let speech = Arc::new(FakeSpeech {
            frames: self.speech_frames,
            ledger: Arc::clone(&ledger),
            voices: Mutex::new(Vec::new()),
        });
        let services = Services {
            resolver: Arc::new(FakeResolver {
                broken: self.broken,
            }),
            streams: Arc::new(FakeStreams {
                frames: self.music_frames,
                delay: self.open_delay,
                ledger: Arc::clone(&ledger),
            }),
            speech: speech.clone(),
            transport: Arc::new(LocalTransport::new(Arc::new(NullSink), self.realtime)),
        };
        let gate = AccessGate::new(ADMIN, self.store);
        let (playback, _task) = Coordinator::spawn(
            services,
            gate,
            PlaybackConfig {
                workers: 2,
                default_voice: "ru-RU-DmitryNeural".into(),
            },
        )
        .unwrap();
        Harness {
            playback,
            ledger,
            speech,
        }
    }
}

impl Harness {
    /// Poll the guild snapshot until `done` holds
    pub async fn wait_for(&self, what: &str, done: impl Fn(&GuildSnapshot) -> bool) -> GuildSnapshot {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(snapshot) = self.playback.snapshot(GUILD).await.unwrap() {
                if done(&snapshot) {
                    return snapshot;
                }
                if Instant::now() > deadline {
                    panic!("timed out waiting for {}: {:?}", what, snapshot);
                }
            } else if Instant::now() > deadline {
                panic!("timed out waiting for {}: no guild state", what);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stopped playback threads close their streams shortly after the request
    pub async fn wait_streams_closed(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.ledger.open_now() > 0 {
            if Instant::now() > deadline {
                panic!("{} streams still open", self.ledger.open_now());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
