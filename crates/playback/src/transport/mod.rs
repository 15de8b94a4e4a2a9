//! Voice transport abstraction.
//!
//! A transport owns the voice connection of one session and plays one
//! [`PlayableHandle`] at a time. The coordinator is the only caller; it hands
//! every track a [`CompletionHandle`] which the transport fires exactly once
//! when the track ends on its own. Tracks ended through [`VoiceTransport::stop`]
//! do not have to fire it, and a late firing is ignored anyway.

mod ffmpeg;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::coordinator::Message;
use crate::error::TransportError;
use crate::session::SessionId;
use crate::track::PlayableHandle;

pub use ffmpeg::{FfmpegConfig, FfmpegTransport};

/// Identifier of a voice channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a track ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    Finished,
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct TrackCompletion {
    pub generation: u64,
    pub end: TrackEnd,
}

/// One-shot notification back into the coordinator that started the track
#[derive(Debug)]
pub struct CompletionHandle {
    generation: u64,
    mailbox: mpsc::WeakSender<Message>,
}

impl CompletionHandle {
    pub(crate) fn new(generation: u64, mailbox: mpsc::WeakSender<Message>) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    /// A handle whose notification goes nowhere
    #[cfg(test)]
    pub(crate) fn detached(generation: u64) -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self::new(generation, tx.downgrade())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report the end of the track. Consumes the handle, so it fires at most once.
    pub async fn notify(self, end: TrackEnd) {
        // The session may already be gone
        if let Some(mailbox) = self.mailbox.upgrade() {
            let _ = mailbox
                .send(Message::TrackEnded(TrackCompletion {
                    generation: self.generation,
                    end,
                }))
                .await;
        }
    }
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel: &ChannelId) -> Result<(), TransportError>;

    async fn move_to(&self, channel: &ChannelId) -> Result<(), TransportError>;

    /// Stops playback and leaves the channel
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Start playing, replacing anything currently playing
    async fn play(
        &self,
        handle: PlayableHandle,
        on_complete: CompletionHandle,
    ) -> Result<(), TransportError>;

    async fn pause(&self) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn current_channel(&self) -> Option<ChannelId>;
}

/// Creates the transport of a new session
pub trait TransportFactory: Send + Sync {
    fn create(&self, session: &SessionId) -> Arc<dyn VoiceTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&SessionId) -> Arc<dyn VoiceTransport> + Send + Sync,
{
    fn create(&self, session: &SessionId) -> Arc<dyn VoiceTransport> {
        self(session)
    }
}
