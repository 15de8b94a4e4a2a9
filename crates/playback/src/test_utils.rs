//! Test doubles shared by the unit tests of this crate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use media_extract::{ExtractorError, MediaExtractor, MediaInfo};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::{ResolveError, TransportError};
use crate::events::{PlaybackEvent, SessionEvent};
use crate::resolver::TrackResolver;
use crate::track::{PlayableHandle, ResolvedTrack};
use crate::transport::{ChannelId, CompletionHandle, TrackEnd, VoiceTransport};

/// Initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        $crate::init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

fn extraction_failure() -> ExtractorError {
    ExtractorError::Process {
        status: "exit status: 1".to_string(),
        stderr: "ERROR: Video unavailable".to_string(),
    }
}

/// Wait for the next event matching `predicate`, panicking after five seconds
pub async fn next_matching(
    events: &mut broadcast::Receiver<SessionEvent>,
    predicate: impl Fn(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent { event, .. }) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for event")
}

/// Serve `body` to a single HTTP request, returns the base URL
pub async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: audio/webm\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Accept one request and never finish the response. With `partial_body` the
/// status line, headers and a few body bytes are sent before going silent.
pub async fn serve_stalled(partial_body: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        if partial_body {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: audio/webm\r\nContent-Length: 4096\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(b"OggS").await;
            let _ = socket.flush().await;
        }
        // Hold the connection open
        std::future::pending::<()>().await;
        drop(socket);
    });

    format!("http://{addr}")
}

/// Extractor returning canned media info
pub struct FakeExtractor {
    calls: AtomicUsize,
    last_download: Mutex<Option<bool>>,
    delay: Duration,
    local_dir: Option<PathBuf>,
    direct_base: String,
    failing: FxHashSet<String>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_download: Mutex::new(None),
            delay: Duration::ZERO,
            local_dir: None,
            direct_base: "https://cdn.example.com".to_string(),
            failing: FxHashSet::default(),
        }
    }

    /// Write a downloaded file here when asked to download
    pub fn with_local_dir(mut self, dir: PathBuf) -> Self {
        self.local_dir = Some(dir);
        self
    }

    pub fn with_direct_base(mut self, base: String) -> Self {
        self.direct_base = base;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_download(&self) -> Option<bool> {
        *self.last_download.lock()
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract_info(&self, url: &str, download: bool) -> Result<MediaInfo, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_download.lock() = Some(download);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(url) {
            return Err(extraction_failure());
        }

        let local_path = match (&self.local_dir, download) {
            (Some(dir), true) => {
                tokio::fs::create_dir_all(dir).await.unwrap();
                let path = dir.join(format!("{}.webm", uuid::Uuid::new_v4().simple()));
                tokio::fs::write(&path, url.as_bytes()).await.unwrap();
                Some(path)
            }
            _ => None,
        };

        Ok(MediaInfo {
            id: "fake".to_string(),
            title: format!("Title of {url}"),
            extractor: "fake".to_string(),
            webpage_url: Some(url.to_string()),
            direct_url: Some(format!("{}/audio.webm", self.direct_base)),
            extension: Some("webm".to_string()),
            http_headers: FxHashMap::default(),
            local_path,
            duration: Some(180.0),
            is_playlist: false,
            entries: Vec::new(),
        })
    }
}

/// Resolver that answers every URL with a remote handle to itself
pub struct ScriptedResolver {
    calls: Mutex<Vec<String>>,
    failing: FxHashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: FxHashSet::default(),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }

    /// Highest number of resolutions observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for ScriptedResolver {
    async fn resolve(&self, url: &str, _streaming: bool) -> Result<ResolvedTrack, ResolveError> {
        self.calls.lock().push(url.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(extraction_failure().into());
        }
        Ok(ResolvedTrack {
            source_url: url.to_string(),
            title: format!("Title of {url}"),
            handle: PlayableHandle::Remote {
                url: url.to_string(),
                http_headers: FxHashMap::default(),
            },
            cache_path: None,
            from_cache: false,
            duration: Some(Duration::from_secs(180)),
        })
    }
}

#[derive(Default)]
struct MockState {
    channel: Option<ChannelId>,
    current: Option<PlayableHandle>,
    completion: Option<CompletionHandle>,
    paused: bool,
    played: Vec<PlayableHandle>,
}

/// In-memory transport; tests end tracks by hand
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    complete_on_stop: bool,
    rejecting: FxHashSet<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the completion of a stopped track, like callback based voice libraries do
    pub fn completing_on_stop(mut self) -> Self {
        self.complete_on_stop = true;
        self
    }

    /// Refuse to play the handle whose input is `input`
    pub fn rejecting(mut self, input: &str) -> Self {
        self.rejecting.insert(input.to_string());
        self
    }

    /// Inputs of every successfully started track, in order
    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.iter().map(PlayableHandle::input).collect()
    }

    pub fn handles(&self) -> Vec<PlayableHandle> {
        self.state.lock().played.clone()
    }

    pub fn take_completion(&self) -> Option<CompletionHandle> {
        self.state.lock().completion.take()
    }

    /// End the current track naturally
    pub async fn finish_current(&self) {
        let completion = {
            let mut state = self.state.lock();
            state.current = None;
            state.paused = false;
            state.completion.take()
        };
        if let Some(completion) = completion {
            completion.notify(TrackEnd::Finished).await;
        }
    }

    /// Lose the voice connection behind the coordinator's back
    pub fn drop_connection(&self) {
        self.state.lock().channel = None;
    }

    fn halt(&self) {
        let completion = {
            let mut state = self.state.lock();
            state.current = None;
            state.paused = false;
            state.completion.take()
        };
        if let Some(completion) = completion.filter(|_| self.complete_on_stop) {
            tokio::spawn(completion.notify(TrackEnd::Finished));
        }
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(&self, channel: &ChannelId) -> Result<(), TransportError> {
        self.state.lock().channel = Some(channel.clone());
        Ok(())
    }

    async fn move_to(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.channel = Some(channel.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.halt();
        self.state.lock().channel = None;
        Ok(())
    }

    async fn play(
        &self,
        handle: PlayableHandle,
        on_complete: CompletionHandle,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.rejecting.contains(&handle.input()) {
            return Err(TransportError::Decoder("unsupported codec".to_string()));
        }
        state.played.push(handle.clone());
        state.current = Some(handle);
        state.completion = Some(on_complete);
        state.paused = false;
        Ok(())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.current.is_some() {
            state.paused = true;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.state.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.halt();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && !state.paused
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && state.paused
    }

    fn is_connected(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    fn current_channel(&self) -> Option<ChannelId> {
        self.state.lock().channel.clone()
    }
}
