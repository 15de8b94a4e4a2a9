use std::path::PathBuf;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ExtractorError;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// Information about a media item as reported by an extractor.
///
/// A playlist is reported as a `MediaInfo` with `is_playlist` set and its
/// items in `entries`; use [`MediaInfo::into_playable`] to get the item that
/// should actually be played.
///
/// # Fields
///
/// * `id` - Extractor specific identifier of the item
/// * `title` - Title of the item
/// * `extractor` - Name of the extractor that handled the page (e.g. "youtube")
/// * `webpage_url` - Canonical page URL, if reported
/// * `direct_url` - URL of the selected media format, playable without the extractor
/// * `extension` - Container extension of the selected format
/// * `http_headers` - Headers required when fetching `direct_url`
/// * `local_path` - Set when the extractor already persisted the media itself
/// * `duration` - Duration in seconds, if known
/// * `entries` - Items of a playlist
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub extractor: String,
    pub webpage_url: Option<String>,
    pub direct_url: Option<String>,
    pub extension: Option<String>,
    pub http_headers: FxHashMap<String, String>,
    pub local_path: Option<PathBuf>,
    pub duration: Option<f64>,
    pub is_playlist: bool,
    pub entries: Vec<MediaInfo>,
}

impl MediaInfo {
    /// Reduce a playlist to its first entry.
    ///
    /// Single items are returned unchanged. Fails when a playlist has no
    /// entries, or when the selected item has neither a direct URL nor a
    /// local file.
    pub fn into_playable(self) -> Result<MediaInfo, ExtractorError> {
        if self.is_playlist {
            let first = self
                .entries
                .into_iter()
                .next()
                .ok_or(ExtractorError::EmptyPlaylist)?;
            // Nested playlists (e.g. channel -> uploads) are unwrapped too
            return first.into_playable();
        }

        if self.direct_url.is_none() && self.local_path.is_none() {
            return Err(ExtractorError::NoAudioFormat);
        }

        Ok(self)
    }
}
