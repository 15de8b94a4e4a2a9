//! Per-session playback coordinator.
//!
//! Every session runs one coordinator task which owns the queue, the prefetch
//! slot, the player state and the transport. User requests and track
//! completions arrive through a single mailbox and are handled one at a time,
//! so advancing to the next track is never re-entered.
//!
//! Each started track gets a generation number. Skip, stop and leave bump the
//! generation before stopping the transport, which turns any completion still
//! in flight for the old track into a no-op.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, UserInputError};
use crate::events::{PlaybackEvent, PlayerState, SessionEvent, SessionStatus};
use crate::prefetch::PrefetchSlot;
use crate::queue::PlaybackQueue;
use crate::resolver::TrackResolver;
use crate::session::SessionId;
use crate::track::{ResolvedTrack, TrackSummary};
use crate::transport::{ChannelId, CompletionHandle, TrackCompletion, TrackEnd, VoiceTransport};

type Reply<T> = oneshot::Sender<Result<T, PlaybackError>>;

pub(crate) enum Request {
    Play {
        urls: Vec<String>,
        channel: ChannelId,
        reply: Reply<Vec<usize>>,
    },
    Join {
        channel: ChannelId,
        reply: Reply<()>,
    },
    Leave {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Skip {
        reply: Reply<TrackSummary>,
    },
    Stop {
        reply: Reply<usize>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
}

pub(crate) enum Message {
    Request(Request),
    TrackEnded(TrackCompletion),
}

/// Cloneable client side of a session's coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    session: SessionId,
    mailbox: mpsc::Sender<Message>,
}

impl CoordinatorHandle {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The coordinator task has exited
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Queue `url`, joining `channel` first. Playback starts right away when
    /// the session is idle. Returns the 1-based queue position.
    pub async fn enqueue_and_maybe_start(
        &self,
        url: impl Into<String>,
        channel: ChannelId,
    ) -> Result<usize, PlaybackError> {
        let positions = self
            .enqueue_all_and_maybe_start(vec![url.into()], channel)
            .await?;
        Ok(positions.first().copied().unwrap_or_default())
    }

    /// Queue every URL in order as one request, so playback of the first one
    /// cannot run the queue dry while the others are still waiting outside it.
    /// Returns the 1-based queue position of each URL.
    pub async fn enqueue_all_and_maybe_start(
        &self,
        urls: Vec<String>,
        channel: ChannelId,
    ) -> Result<Vec<usize>, PlaybackError> {
        if urls.is_empty() {
            return Err(UserInputError::MissingArgument("url").into());
        }
        self.request(|reply| Request::Play {
            urls,
            channel,
            reply,
        })
        .await
    }

    pub async fn join(&self, channel: ChannelId) -> Result<(), PlaybackError> {
        self.request(|reply| Request::Join { channel, reply }).await
    }

    /// Stop, clear the queue and disconnect
    pub async fn leave(&self) -> Result<(), PlaybackError> {
        self.request(|reply| Request::Leave { reply }).await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.request(|reply| Request::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        self.request(|reply| Request::Resume { reply }).await
    }

    /// End the current track and move on, returns the skipped track
    pub async fn skip(&self) -> Result<TrackSummary, PlaybackError> {
        self.request(|reply| Request::Skip { reply }).await
    }

    /// End the current track and clear the queue, returns how many entries were dropped
    pub async fn stop(&self) -> Result<usize, PlaybackError> {
        self.request(|reply| Request::Stop { reply }).await
    }

    pub async fn status(&self) -> Result<SessionStatus, PlaybackError> {
        self.request(|reply| Request::Status { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, PlaybackError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Message::Request(build(reply)))
            .await
            .map_err(|_| self.closed())?;
        response.await.map_err(|_| self.closed())?
    }

    fn closed(&self) -> PlaybackError {
        PlaybackError::SessionClosed(self.session.to_string())
    }
}

pub struct PlaybackCoordinator {
    session: SessionId,
    config: PlaybackConfig,
    resolver: Arc<dyn TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    events: broadcast::Sender<SessionEvent>,

    queue: PlaybackQueue,
    prefetch: PrefetchSlot,
    state: PlayerState,
    now_playing: Option<ResolvedTrack>,
    generation: u64,

    inbox: mpsc::Receiver<Message>,
    mailbox: mpsc::WeakSender<Message>,
}

impl PlaybackCoordinator {
    /// Spawn the coordinator task of `session`.
    ///
    /// The task runs until every [`CoordinatorHandle`] is dropped, then stops
    /// playback and disconnects.
    pub fn spawn(
        session: SessionId,
        config: PlaybackConfig,
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        events: broadcast::Sender<SessionEvent>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let coordinator = PlaybackCoordinator {
            session: session.clone(),
            config,
            resolver,
            transport,
            events,
            queue: PlaybackQueue::new(),
            prefetch: PrefetchSlot::default(),
            state: PlayerState::Idle,
            now_playing: None,
            generation: 0,
            inbox: rx,
            mailbox: tx.downgrade(),
        };

        let span = info_span!("session", id = %session);
        tokio::spawn(coordinator.run().instrument(span));

        CoordinatorHandle {
            session,
            mailbox: tx,
        }
    }

    async fn run(mut self) {
        debug!("Coordinator started");
        while let Some(message) = self.inbox.recv().await {
            match message {
                Message::Request(request) => self.handle_request(request).await,
                Message::TrackEnded(completion) => self.on_track_end(completion).await,
            }
        }
        self.shutdown().await;
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Play {
                urls,
                channel,
                reply,
            } => {
                let queued = self.enqueue(urls, &channel).await;
                let accepted = queued.is_ok();
                let _ = reply.send(queued);
                if accepted {
                    if self.state == PlayerState::Idle {
                        self.advance().await;
                    } else {
                        self.refresh_prefetch();
                    }
                }
            }
            Request::Join { channel, reply } => {
                let _ = reply.send(self.connect_to(&channel).await);
            }
            Request::Leave { reply } => {
                let _ = reply.send(self.leave().await);
            }
            Request::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            Request::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Request::Skip { reply } => {
                let skipped = self.skip().await;
                let accepted = skipped.is_ok();
                let _ = reply.send(skipped);
                if accepted {
                    self.advance().await;
                }
            }
            Request::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            Request::Status { reply } => {
                let _ = reply.send(Ok(self.status()));
            }
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        debug!(?event, "Publishing event");
        // Nobody listening is fine
        let _ = self.events.send(SessionEvent {
            session: self.session.clone(),
            event,
        });
    }

    fn is_active(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }

    async fn connect_to(&mut self, channel: &ChannelId) -> Result<(), PlaybackError> {
        match self.transport.current_channel() {
            Some(current) if current == *channel => {}
            Some(_) => {
                self.transport.move_to(channel).await?;
                self.emit(PlaybackEvent::Moved {
                    channel: channel.clone(),
                });
            }
            None => {
                self.transport.connect(channel).await?;
                self.emit(PlaybackEvent::Connected {
                    channel: channel.clone(),
                });
            }
        }
        Ok(())
    }

    async fn enqueue(
        &mut self,
        urls: Vec<String>,
        channel: &ChannelId,
    ) -> Result<Vec<usize>, PlaybackError> {
        self.connect_to(channel).await?;
        let mut positions = Vec::with_capacity(urls.len());
        for url in urls {
            let position = self.queue.enqueue(url.clone());
            info!(%url, position, "Queued");
            self.emit(PlaybackEvent::Queued { url, position });
            positions.push(position);
        }
        Ok(positions)
    }

    /// Start the next playable entry, or go idle when the queue runs dry.
    ///
    /// Entries that fail to resolve or play are reported and dropped, the
    /// loop moves on to the following one.
    #[instrument(skip(self), level = "debug")]
    async fn advance(&mut self) {
        self.state = PlayerState::Advancing;
        self.now_playing = None;

        loop {
            let Some(head) = self.queue.peek_head().map(str::to_owned) else {
                self.finish_queue().await;
                return;
            };

            if !self.transport.is_connected() {
                warn!(pending = self.queue.len(), "Voice transport not connected, pausing the queue");
                self.prefetch.clear();
                self.state = PlayerState::Idle;
                self.emit(PlaybackEvent::NotConnected {
                    pending: self.queue.len(),
                });
                return;
            }

            let resolved = match self.prefetch.take_for(&head).await {
                Some(result) => result,
                None => self.resolver.resolve(&head, self.config.streaming).await,
            };
            self.queue.dequeue_head();

            let track = match resolved {
                Ok(track) => track,
                Err(e) => {
                    warn!(url = %head, error = %e, "Failed to resolve track, skipping");
                    self.emit(PlaybackEvent::ResolutionFailed {
                        url: head,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            self.generation += 1;
            let completion = CompletionHandle::new(self.generation, self.mailbox.clone());
            if let Err(e) = self.transport.play(track.handle.clone(), completion).await {
                error!(url = %head, error = %e, "Failed to start playback, skipping");
                self.emit(PlaybackEvent::PlaybackFailed {
                    url: head,
                    error: e.to_string(),
                });
                continue;
            }

            info!(url = %head, title = %track.title, from_cache = track.from_cache, "Now playing");
            self.state = PlayerState::Playing;
            self.emit(PlaybackEvent::NowPlaying(track.summary()));
            self.now_playing = Some(track);
            self.refresh_prefetch();
            return;
        }
    }

    async fn finish_queue(&mut self) {
        info!("Queue finished");
        self.state = PlayerState::Idle;
        self.prefetch.clear();
        self.emit(PlaybackEvent::QueueFinished);

        if self.config.disconnect_when_idle && self.transport.is_connected() {
            match self.transport.disconnect().await {
                Ok(()) => self.emit(PlaybackEvent::Disconnected),
                Err(e) => warn!(error = %e, "Failed to disconnect after queue finished"),
            }
        }
    }

    fn refresh_prefetch(&mut self) {
        if !self.config.prefetch {
            return;
        }
        match self.queue.peek_head() {
            None => self.prefetch.clear(),
            Some(head) if self.prefetch.is_for(head) => {}
            Some(head) => self
                .prefetch
                .start(head, self.resolver.clone(), self.config.streaming),
        }
    }

    async fn on_track_end(&mut self, completion: TrackCompletion) {
        if completion.generation != self.generation || !self.is_active() {
            debug!(
                generation = completion.generation,
                current = self.generation,
                "Ignoring stale track completion"
            );
            return;
        }

        let url = self
            .now_playing
            .as_ref()
            .map(|track| track.source_url.clone())
            .unwrap_or_default();
        match completion.end {
            TrackEnd::Finished => info!(%url, "Track finished"),
            TrackEnd::Failed(error) => {
                warn!(%url, %error, "Track ended with an error");
                self.emit(PlaybackEvent::PlaybackFailed { url, error });
            }
        }
        self.advance().await;
    }

    /// Invalidate the current track's completion and stop the transport
    async fn end_current(&mut self) {
        self.generation += 1;
        self.now_playing = None;
        if let Err(e) = self.transport.stop().await {
            warn!(error = %e, "Failed to stop transport");
        }
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlayerState::Playing {
            return Err(UserInputError::NothingPlaying.into());
        }
        self.transport.pause().await?;
        self.state = PlayerState::Paused;
        self.emit(PlaybackEvent::Paused);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlayerState::Paused {
            return Err(UserInputError::NotPaused.into());
        }
        self.transport.resume().await?;
        self.state = PlayerState::Playing;
        self.emit(PlaybackEvent::Resumed);
        Ok(())
    }

    async fn skip(&mut self) -> Result<TrackSummary, PlaybackError> {
        if !self.is_active() {
            return Err(UserInputError::NothingPlaying.into());
        }
        let skipped = self
            .now_playing
            .as_ref()
            .map(ResolvedTrack::summary)
            .ok_or(UserInputError::NothingPlaying)?;

        info!(url = %skipped.url, "Skipping track");
        self.end_current().await;
        self.emit(PlaybackEvent::Skipped {
            track: skipped.clone(),
        });
        Ok(skipped)
    }

    async fn stop(&mut self) -> Result<usize, PlaybackError> {
        let cleared = self.queue.clear();
        self.prefetch.clear();

        if !self.is_active() {
            self.state = PlayerState::Idle;
            return Err(UserInputError::NothingPlaying.into());
        }

        info!(cleared, "Stopping playback");
        self.end_current().await;
        self.state = PlayerState::Idle;
        self.emit(PlaybackEvent::Stopped { cleared });
        Ok(cleared)
    }

    async fn leave(&mut self) -> Result<(), PlaybackError> {
        if !self.transport.is_connected() {
            return Err(UserInputError::NotConnected.into());
        }

        self.queue.clear();
        self.prefetch.clear();
        if self.is_active() {
            self.end_current().await;
        }
        self.state = PlayerState::Idle;

        self.transport.disconnect().await?;
        self.emit(PlaybackEvent::Disconnected);
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            session: self.session.clone(),
            state: self.state,
            channel: self.transport.current_channel(),
            now_playing: self.now_playing.as_ref().map(ResolvedTrack::summary),
            queue: self.queue.snapshot(),
            prefetching: self.prefetch.target().map(str::to_owned),
        }
    }

    async fn shutdown(&mut self) {
        self.queue.clear();
        self.prefetch.clear();
        if self.is_active() {
            self.end_current().await;
        }
        self.state = PlayerState::Idle;

        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Failed to disconnect on shutdown");
            }
        }
        debug!("Coordinator stopped");
    }
}
