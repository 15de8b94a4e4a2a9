use std::fmt;

use crate::session::SessionId;
use crate::track::TrackSummary;
use crate::transport::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    /// Between tracks, the next one is being resolved
    Advancing,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Advancing => "advancing",
        };
        f.write_str(name)
    }
}

/// Progress notifications published by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Connected { channel: ChannelId },
    Moved { channel: ChannelId },
    Disconnected,
    Queued { url: String, position: usize },
    NowPlaying(TrackSummary),
    Paused,
    Resumed,
    Skipped { track: TrackSummary },
    Stopped { cleared: usize },
    /// A queue entry could not be resolved and was dropped
    ResolutionFailed { url: String, error: String },
    /// The transport rejected or aborted a track
    PlaybackFailed { url: String, error: String },
    /// The transport lost its connection, the queue is kept
    NotConnected { pending: usize },
    QueueFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: PlaybackEvent,
}

/// Snapshot returned by a status request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub session: SessionId,
    pub state: PlayerState,
    pub channel: Option<ChannelId>,
    pub now_playing: Option<TrackSummary>,
    pub queue: Vec<String>,
    /// Queue entry currently resolving in the background
    pub prefetching: Option<String>,
}
