use async_trait::async_trait;

use crate::{ExtractorError, MediaInfo};

/// Resolves a page URL (or search query) to media information.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Extract information for `url`.
    ///
    /// `download` tells the extractor the caller is going to persist the
    /// media, so it should prefer a format that can be fetched as a single
    /// file. An extractor that persists the media itself reports the file in
    /// [`MediaInfo::local_path`].
    async fn extract_info(&self, url: &str, download: bool) -> Result<MediaInfo, ExtractorError>;
}
