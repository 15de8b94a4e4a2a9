//! Transport that decodes tracks with an `ffmpeg` child process.
//!
//! ffmpeg turns the input into 48 kHz stereo s16le PCM on stdout. The PCM is
//! pumped out in 20 ms frames at real-time pace into a per-channel sink: a
//! `<channel>.pcm` file under the configured output directory, or nowhere.
//! Pausing parks the pump, stopping cancels it and kills the child.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ChannelId, CompletionHandle, TrackEnd, VoiceTransport};
use crate::error::TransportError;
use crate::track::PlayableHandle;

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub binary: PathBuf,
    /// Linear gain applied by the decoder
    pub volume: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration: Duration,
    /// Where decoded PCM is written, discarded when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            volume: 0.5,
            sample_rate: 48_000,
            channels: 2,
            frame_duration: Duration::from_millis(20),
            output_dir: None,
        }
    }
}

impl FfmpegConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Bytes of s16le PCM in one frame
    pub fn frame_bytes(&self) -> usize {
        let samples = self.sample_rate as u128 * self.frame_duration.as_micros() / 1_000_000;
        samples as usize * self.channels as usize * 2
    }
}

struct ActiveTrack {
    id: u64,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

#[derive(Default)]
struct TransportState {
    channel: Option<ChannelId>,
    active: Option<ActiveTrack>,
}

pub struct FfmpegTransport {
    config: FfmpegConfig,
    state: Arc<Mutex<TransportState>>,
    next_track: AtomicU64,
}

impl FfmpegTransport {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TransportState::default())),
            next_track: AtomicU64::new(1),
        }
    }

    fn build_command(&self, handle: &PlayableHandle) -> Command {
        let mut command = Command::new(&self.config.binary);
        command.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);

        if let PlayableHandle::Remote { http_headers, .. } = handle {
            command.args([
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
            ]);
            if !http_headers.is_empty() {
                let headers: String = http_headers
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}\r\n"))
                    .collect();
                command.arg("-headers").arg(headers);
            }
        }

        command
            .arg("-i")
            .arg(handle.input())
            .args(["-vn", "-filter:a"])
            .arg(format!("volume={}", self.config.volume))
            .args(["-f", "s16le", "-ar"])
            .arg(self.config.sample_rate.to_string())
            .arg("-ac")
            .arg(self.config.channels.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn open_sink(
        &self,
        channel: &ChannelId,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, TransportError> {
        let Some(dir) = &self.config.output_dir else {
            return Ok(Box::new(tokio::io::sink()));
        };

        tokio::fs::create_dir_all(dir).await?;
        let name: String = channel
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{name}.pcm")))
            .await?;
        Ok(Box::new(file))
    }

    fn cancel_active(&self) {
        if let Some(active) = self.state.lock().active.take() {
            debug!(track = active.id, "Cancelling active track");
            active.cancel.cancel();
        }
    }
}

#[async_trait]
impl VoiceTransport for FfmpegTransport {
    async fn connect(&self, channel: &ChannelId) -> Result<(), TransportError> {
        info!(%channel, "Connected to voice channel");
        self.state.lock().channel = Some(channel.clone());
        Ok(())
    }

    async fn move_to(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            return Err(TransportError::NotConnected);
        }
        info!(%channel, "Moved to voice channel");
        state.channel = Some(channel.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.cancel_active();
        if let Some(channel) = self.state.lock().channel.take() {
            info!(%channel, "Disconnected from voice channel");
        }
        Ok(())
    }

    async fn play(
        &self,
        handle: PlayableHandle,
        on_complete: CompletionHandle,
    ) -> Result<(), TransportError> {
        let Some(channel) = self.current_channel() else {
            return Err(TransportError::NotConnected);
        };
        self.cancel_active();

        let sink = self.open_sink(&channel).await?;
        let mut child = self
            .build_command(&handle)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                binary: self.config.binary.display().to_string(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Err(TransportError::Decoder("decoder stdout unavailable".into()));
        };

        let id = self.next_track.fetch_add(1, Ordering::Relaxed);
        let stderr = child.stderr.take().map(|pipe| drain_stderr(pipe, id));
        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let pump = PcmPump {
            frame_bytes: self.config.frame_bytes(),
            frame_duration: self.config.frame_duration,
            cancel: cancel.clone(),
            paused: paused_rx,
        };

        self.state.lock().active = Some(ActiveTrack {
            id,
            cancel,
            paused: paused_tx,
        });
        info!(track = id, input = %handle.input(), %channel, "Starting decoder");

        let state = self.state.clone();
        tokio::spawn(async move {
            let outcome = pump.run(stdout, sink).await;
            let end = match outcome {
                PumpOutcome::Stopped => {
                    let _ = child.kill().await;
                    debug!(track = id, "Track stopped");
                    return;
                }
                PumpOutcome::Finished => wait_decoder(&mut child, stderr).await,
                PumpOutcome::Failed(error) => {
                    let _ = child.kill().await;
                    TrackEnd::Failed(error)
                }
            };

            {
                let mut state = state.lock();
                if state.active.as_ref().is_some_and(|active| active.id == id) {
                    state.active = None;
                }
            }

            match &end {
                TrackEnd::Finished => debug!(track = id, "Track finished"),
                TrackEnd::Failed(error) => warn!(track = id, %error, "Track failed"),
            }
            on_complete.notify(end).await;
        });

        Ok(())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        if let Some(active) = &self.state.lock().active {
            active.paused.send_replace(true);
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        if let Some(active) = &self.state.lock().active {
            active.paused.send_replace(false);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.cancel_active();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| !*active.paused.borrow())
    }

    fn is_paused(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| *active.paused.borrow())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    fn current_channel(&self) -> Option<ChannelId> {
        self.state.lock().channel.clone()
    }
}

/// Lines of decoder output kept for the failure message
const STDERR_TAIL_LINES: usize = 20;

/// Read the decoder's stderr until EOF from the moment it starts, so a chatty
/// decoder never blocks on a full pipe. Resolves to the last lines.
fn drain_stderr<R>(pipe: R, track: u64) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line).trim_end().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    trace!(track, "decoder: {text}");
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(text);
                }
            }
        }

        Vec::from(tail).join("\n")
    })
}

async fn wait_decoder(child: &mut Child, stderr: Option<JoinHandle<String>>) -> TrackEnd {
    let status = child.wait().await;
    let stderr = match stderr {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    match status {
        Ok(status) if status.success() => TrackEnd::Finished,
        Ok(status) => TrackEnd::Failed(format!("decoder exited with {status}: {}", stderr.trim())),
        Err(e) => TrackEnd::Failed(e.to_string()),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    Finished,
    Stopped,
    Failed(String),
}

/// Copies PCM frames from the decoder to the sink at playback pace
struct PcmPump {
    frame_bytes: usize,
    frame_duration: Duration,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
}

impl PcmPump {
    async fn run<R, W>(mut self, mut source: R, mut sink: W) -> PumpOutcome
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frame = vec![0u8; self.frame_bytes];
        let mut ticker = tokio::time::interval(self.frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let paused = *self.paused.borrow_and_update();
            if paused {
                tokio::select! {
                    _ = self.cancel.cancelled() => return PumpOutcome::Stopped,
                    changed = self.paused.changed() => {
                        if changed.is_err() {
                            return PumpOutcome::Stopped;
                        }
                        ticker.reset();
                        continue;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpOutcome::Stopped,
                _ = ticker.tick() => {}
            }

            let filled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpOutcome::Stopped,
                filled = read_frame(&mut source, &mut frame) => filled,
            };

            match filled {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = sink.write_all(&frame[..n]).await {
                        return PumpOutcome::Failed(format!("sink write failed: {e}"));
                    }
                }
                Err(e) => return PumpOutcome::Failed(format!("decoder read failed: {e}")),
            }
        }

        if let Err(e) = sink.flush().await {
            return PumpOutcome::Failed(format!("sink flush failed: {e}"));
        }
        PumpOutcome::Finished
    }
}

/// Fill `frame` as far as the source allows; a short count means end of stream
async fn read_frame<R: AsyncRead + Unpin>(source: &mut R, frame: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < frame.len() {
        let n = source.read(&mut frame[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
