//! Local voice transport
//!
//! Plays streams on a dedicated thread per connection, pulling one frame
//! every 20 ms (or as fast as possible when pacing is off) and writing it to
//! a [`FrameSink`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::audio::frame::{BoxedFrameStream, Canceller, PcmFrame};
use crate::error::{StreamError, TransportError};
use crate::protocol::{ChannelId, GuildId};
use crate::voice::transport::{CompletionCallback, VoiceConnection, VoiceTransport};

/// Destination for played frames
pub trait FrameSink: Send + Sync {
    fn open(&self, guild: GuildId) -> io::Result<Box<dyn Write + Send>>;
}

/// Discards audio
pub struct NullSink;

impl FrameSink for NullSink {
    fn open(&self, _guild: GuildId) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(io::sink()))
    }
}

/// Appends raw PCM to `<dir>/<guild>.pcm`
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FrameSink for FileSink {
    fn open(&self, guild: GuildId) -> io::Result<Box<dyn Write + Send>> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(format!("{}.pcm", guild)))?;
        Ok(Box::new(io::BufWriter::new(file)))
    }
}

pub struct LocalTransport {
    sink: Arc<dyn FrameSink>,
    realtime: bool,
}

impl LocalTransport {
    pub fn new(sink: Arc<dyn FrameSink>, realtime: bool) -> Self {
        Self { sink, realtime }
    }
}

impl VoiceTransport for LocalTransport {
    fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        tracing::info!(guild = %guild, channel = %channel, "Voice connected");
        Ok(Box::new(LocalConnection {
            guild,
            channel,
            sink: Arc::clone(&self.sink),
            realtime: self.realtime,
            current: None,
            stopping: Vec::new(),
            connected: true,
        }))
    }
}

/// The stream currently owned by a playback thread
struct Playback {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    canceller: Option<Canceller>,
    handle: JoinHandle<()>,
}

impl Playback {
    fn halt(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(canceller) = &self.canceller {
            canceller.cancel();
        }
    }
}

pub struct LocalConnection {
    guild: GuildId,
    channel: ChannelId,
    sink: Arc<dyn FrameSink>,
    realtime: bool,
    current: Option<Playback>,
    /// Threads told to stop that have not been joined yet
    stopping: Vec<JoinHandle<()>>,
    connected: bool,
}

impl LocalConnection {
    fn retire_finished(&mut self) {
        let finished = self
            .current
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::SeqCst));
        if finished {
            if let Some(playback) = self.current.take() {
                self.stopping.push(playback.handle);
            }
        }
    }
}

fn join_all(guild: GuildId, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!(guild = %guild, "Playback thread panicked");
        }
    }
}

/// Pull frames until the stream ends, errors or is stopped
fn pump(
    mut stream: BoxedFrameStream,
    mut out: Box<dyn Write + Send>,
    stop: &AtomicBool,
    realtime: bool,
) -> Option<StreamError> {
    let started = Instant::now();
    let mut played: u32 = 0;

    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            break None;
        }
        match stream.read_frame() {
            Ok(Some(frame)) => {
                if let Err(e) = out.write_all(frame.as_bytes()) {
                    break Some(StreamError::Died(format!("sink: {}", e)));
                }
                played += 1;
                if realtime {
                    let due = started + PcmFrame::duration() * played;
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                }
            }
            Ok(None) => break None,
            // A cancelled read surfaces as an error; a stop is not a failure
            Err(_) if stop.load(Ordering::SeqCst) => break None,
            Err(e) => break Some(e),
        }
    };

    stream.close();
    let _ = out.flush();
    tracing::debug!(frames = played, "Playback thread finished");
    outcome
}

impl VoiceConnection for LocalConnection {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    fn play(
        &mut self,
        stream: BoxedFrameStream,
        on_complete: CompletionCallback,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.is_playing() {
            return Err(TransportError::Play("already playing audio".into()));
        }
        self.retire_finished();

        let previous = std::mem::take(&mut self.stopping);
        let sink = Arc::clone(&self.sink);
        let guild = self.guild;
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let canceller = stream.canceller();
        let realtime = self.realtime;

        let stop_for_thread = Arc::clone(&stop);
        let finished_for_thread = Arc::clone(&finished);
        let handle = thread::Builder::new()
            .name(format!("voice-{}", self.guild))
            .spawn(move || {
                // Streams of one connection never overlap
                join_all(guild, previous);
                let outcome = match sink.open(guild) {
                    Ok(out) => pump(stream, out, &stop_for_thread, realtime),
                    Err(e) => {
                        let mut stream = stream;
                        stream.close();
                        Some(StreamError::Died(format!("sink: {}", e)))
                    }
                };
                finished_for_thread.store(true, Ordering::SeqCst);
                on_complete(outcome);
            })
            .map_err(|e| TransportError::Play(e.to_string()))?;

        self.current = Some(Playback {
            stop,
            finished,
            canceller,
            handle,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(playback) = self.current.take() else {
            return;
        };
        // The thread exits at its next frame boundary and closes the stream
        playback.halt();
        self.stopping.push(playback.handle);
    }

    fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::SeqCst))
    }

    fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        tracing::info!(guild = %self.guild, from = %self.channel, to = %channel, "Voice moved");
        self.channel = channel;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop();
        join_all(self.guild, std::mem::take(&mut self.stopping));
        self.connected = false;
        tracing::info!(guild = %self.guild, "Voice disconnected");
        Ok(())
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        // Unjoined threads finish on their own
        if let Some(playback) = self.current.take() {
            playback.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::{AudioFrameStream, PcmBufferStream};
    use crate::constants::FRAME_BYTES;
    use bytes::Bytes;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    fn connection(realtime: bool) -> Box<dyn VoiceConnection> {
        LocalTransport::new(Arc::new(NullSink), realtime)
            .connect(GuildId(1), ChannelId(10))
            .unwrap()
    }

    fn buffer(frames: usize) -> BoxedFrameStream {
        Box::new(PcmBufferStream::new(Bytes::from(vec![0u8; frames * FRAME_BYTES])))
    }

    #[test]
    fn test_completion_fires_on_transport_thread() {
        let mut conn = connection(false);
        let (tx, rx) = bounded(1);
        conn.play(
            buffer(5),
            Box::new(move |err| {
                let name = thread::current().name().map(str::to_string);
                let _ = tx.send((err, name));
            }),
        )
        .unwrap();

        let (err, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(err.is_none());
        assert_eq!(name.as_deref(), Some("voice-1"));
    }

    #[test]
    fn test_stop_reports_clean_completion() {
        let mut conn = connection(true);
        let (tx, rx) = bounded(1);
        conn.play(buffer(500), Box::new(move |err| {
            let _ = tx.send(err);
        }))
        .unwrap();
        assert!(conn.is_playing());
        assert!(conn.play(buffer(1), Box::new(|_| {})).is_err());

        conn.stop();
        assert!(!conn.is_playing());
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), None);
    }

    /// Each read takes `delay` and logs `label` to `events`
    struct SlowStream {
        label: &'static str,
        delay: Duration,
        events: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl AudioFrameStream for SlowStream {
        fn read_frame(&mut self) -> Result<Option<PcmFrame>, StreamError> {
            self.events.lock().push(format!("{} read", self.label));
            thread::sleep(self.delay);
            Ok(Some(PcmFrame::silence()))
        }

        fn close(&mut self) {
            self.events.lock().push(format!("{} closed", self.label));
        }
    }

    #[test]
    fn test_stop_returns_before_the_thread_exits_and_streams_never_overlap() {
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut conn = connection(false);
        let (tx, rx) = bounded(2);

        let first = SlowStream {
            label: "first",
            delay: Duration::from_millis(300),
            events: Arc::clone(&events),
        };
        let done = tx.clone();
        conn.play(Box::new(first), Box::new(move |err| {
            let _ = done.send(("first", err));
        }))
        .unwrap();
        while events.lock().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        let started = Instant::now();
        conn.stop();
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(!conn.is_playing());

        let second = SlowStream {
            label: "second",
            delay: Duration::from_millis(1),
            events: Arc::clone(&events),
        };
        conn.play(Box::new(second), Box::new(move |err| {
            let _ = tx.send(("second", err));
        }))
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ("first", None));
        while events.lock().len() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        conn.stop();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ("second", None));
        assert_eq!(
            &events.lock()[..3],
            ["first read", "first closed", "second read"]
        );
    }

    #[test]
    fn test_disconnect_waits_for_stopped_playback() {
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut conn = connection(false);
        let stream = SlowStream {
            label: "music",
            delay: Duration::from_millis(100),
            events: Arc::clone(&events),
        };
        conn.play(Box::new(stream), Box::new(|_| {})).unwrap();
        while events.lock().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        conn.disconnect().unwrap();
        assert_eq!(events.lock().last().map(String::as_str), Some("music closed"));
    }

    #[test]
    fn test_file_sink_appends_frames() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(Arc::new(FileSink::new(dir.path())), false);
        let mut conn = transport.connect(GuildId(7), ChannelId(1)).unwrap();

        let (tx, rx) = bounded(1);
        conn.play(buffer(3), Box::new(move |_| {
            let _ = tx.send(());
        }))
        .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        conn.stop();

        let written = fs::read(dir.path().join("7.pcm")).unwrap();
        assert_eq!(written.len(), 3 * FRAME_BYTES);
    }

    #[test]
    fn test_disconnected_connection_rejects_play() {
        let mut conn = connection(false);
        conn.move_to(ChannelId(11)).unwrap();
        assert_eq!(conn.channel(), ChannelId(11));
        conn.disconnect().unwrap();
        assert_eq!(
            conn.play(buffer(1), Box::new(|_| {})).err(),
            Some(TransportError::NotConnected)
        );
    }
}
