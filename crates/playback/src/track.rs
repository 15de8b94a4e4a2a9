use std::path::PathBuf;
use std::time::Duration;

use rustc_hash::FxHashMap;

/// What the voice transport is handed to play
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableHandle {
    /// A file on disk, usually a cache blob
    LocalFile(PathBuf),
    /// A direct media URL, fetched by the decoder itself
    Remote {
        url: String,
        http_headers: FxHashMap<String, String>,
    },
}

impl PlayableHandle {
    /// Decoder input for this handle
    pub fn input(&self) -> String {
        match self {
            PlayableHandle::LocalFile(path) => path.to_string_lossy().into_owned(),
            PlayableHandle::Remote { url, .. } => url.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PlayableHandle::Remote { .. })
    }
}

/// A queue entry ready for playback
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    /// The queue entry this was resolved from
    pub source_url: String,
    pub title: String,
    pub handle: PlayableHandle,
    /// Cache blob backing the handle, if any
    pub cache_path: Option<PathBuf>,
    /// Served from the cache without extraction
    pub from_cache: bool,
    pub duration: Option<Duration>,
}

impl ResolvedTrack {
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            url: self.source_url.clone(),
            title: self.title.clone(),
            from_cache: self.from_cache,
            duration: self.duration,
        }
    }
}

/// The user-facing part of a [`ResolvedTrack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub url: String,
    pub title: String,
    pub from_cache: bool,
    pub duration: Option<Duration>,
}
