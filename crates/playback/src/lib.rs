//! # Playback
//!
//! Queued voice playback for many independent sessions.
//!
//! Each session (a guild) owns a FIFO queue of source URLs and a coordinator
//! task that plays them one after another through a [`VoiceTransport`].
//! Entries are resolved through a [`TrackResolver`]; the bundled
//! [`MediaResolver`] consults the media cache before running the extractor and
//! caches downloads for later plays. While a track plays, the next queue entry
//! is resolved in the background so the following track starts without delay.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use media_cache::{CacheConfig, MediaCache};
//! use media_extract::{YtDlpConfig, YtDlpExtractor};
//! use playback::{
//!     ChannelId, FfmpegConfig, FfmpegTransport, MediaResolver, PlaybackConfig, SessionId,
//!     SessionManager, VoiceTransport,
//! };
//!
//! # async fn run() -> Result<(), playback::PlaybackError> {
//! let cache = MediaCache::new(CacheConfig::default());
//! let extractor = Arc::new(YtDlpExtractor::new(YtDlpConfig::default()));
//! let resolver = Arc::new(MediaResolver::new(cache, extractor, reqwest::Client::new()));
//! let transports = Arc::new(|_: &SessionId| -> Arc<dyn VoiceTransport> {
//!     Arc::new(FfmpegTransport::new(FfmpegConfig::default()))
//! });
//!
//! let manager = SessionManager::new(PlaybackConfig::default(), resolver, transports);
//! let session = manager.session(&SessionId::from("guild"));
//! session
//!     .enqueue_and_maybe_start("https://www.youtube.com/watch?v=dQw4w9WgXcQ", ChannelId::from("general"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
mod prefetch;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod track;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use config::PlaybackConfig;
pub use coordinator::{CoordinatorHandle, PlaybackCoordinator};
pub use error::{PlaybackError, ResolveError, TransportError, UserInputError};
pub use events::{PlaybackEvent, PlayerState, SessionEvent, SessionStatus};
pub use queue::PlaybackQueue;
pub use resolver::{MediaResolver, TrackResolver};
pub use session::{SessionId, SessionManager};
pub use track::{PlayableHandle, ResolvedTrack, TrackSummary};
pub use transport::{
    ChannelId, CompletionHandle, FfmpegConfig, FfmpegTransport, TrackEnd, TransportFactory,
    VoiceTransport,
};
