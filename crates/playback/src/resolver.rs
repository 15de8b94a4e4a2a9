//! Queue entry resolution.
//!
//! [`MediaResolver`] turns a source URL into a [`ResolvedTrack`]:
//!
//! 1. A cache hit is returned as a local file with the stored title, no
//!    extraction happens.
//! 2. In streaming mode (or with the cache disabled) the extractor's direct
//!    URL is returned as a remote handle.
//! 3. Otherwise the media is downloaded into the cache and the blob is played.
//!
//! Resolutions of the same URL are serialized, so a prefetch and a
//! synchronous resolve never extract or download the same media twice.
//! A download that receives nothing for the stall timeout fails, so a dead
//! media server cannot hold up the session.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use media_cache::{CacheKey, CacheMetadata, MediaCache};
use media_extract::{ExtractorError, MediaExtractor};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolveError;
use crate::track::{PlayableHandle, ResolvedTrack};

/// Longest wait for response headers or the next chunk of a download
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, url: &str, streaming: bool) -> Result<ResolvedTrack, ResolveError>;
}

pub struct MediaResolver {
    cache: MediaCache,
    extractor: Arc<dyn MediaExtractor>,
    client: reqwest::Client,
    allow_search: bool,
    stall_timeout: Duration,
    in_flight: Mutex<FxHashMap<CacheKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl MediaResolver {
    pub fn new(cache: MediaCache, extractor: Arc<dyn MediaExtractor>, client: reqwest::Client) -> Self {
        Self {
            cache,
            extractor,
            client,
            allow_search: true,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            in_flight: Mutex::new(FxHashMap::default()),
        }
    }

    /// Whether input that is not a URL is passed on as a search query
    pub fn with_search(mut self, allow_search: bool) -> Self {
        self.allow_search = allow_search;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    fn validate(&self, input: &str) -> Result<(), ResolveError> {
        if input.trim().is_empty() {
            return Err(ResolveError::InvalidUrl(input.to_string()));
        }

        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            Ok(_) => Err(ResolveError::InvalidUrl(input.to_string())),
            Err(_) if self.allow_search => Ok(()),
            Err(_) => Err(ResolveError::InvalidUrl(input.to_string())),
        }
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = in_flight.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        in_flight.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }

    async fn download(
        &self,
        url: &str,
        direct_url: &str,
        http_headers: &FxHashMap<String, String>,
        metadata: CacheMetadata,
    ) -> Result<PathBuf, ResolveError> {
        let mut request = self.client.get(direct_url);
        for (name, value) in http_headers {
            request = request.header(name, value);
        }

        let stall = self.stall_timeout;
        let response = tokio::time::timeout(stall, request.send())
            .await
            .map_err(|_| ResolveError::Stalled(stall))??
            .error_for_status()?;
        debug!(url, length = ?response.content_length(), "Downloading media");

        let body = stream::unfold(Some(response), move |response| async move {
            let mut response = response?;
            match tokio::time::timeout(stall, response.chunk()).await {
                Ok(Ok(Some(chunk))) => Some((Ok(chunk), Some(response))),
                Ok(Ok(None)) => None,
                Ok(Err(e)) => Some((Err(io::Error::other(e)), None)),
                Err(_) => Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "media download stalled")),
                    None,
                )),
            }
        });

        self.cache
            .store_stream(url, body, metadata)
            .await
            .map_err(|e| {
                if is_stall(&e) {
                    warn!(url, timeout = ?stall, "Media download stalled");
                    ResolveError::Stalled(stall)
                } else {
                    ResolveError::Cache(e)
                }
            })
    }
}

/// The cache wraps body errors, look through one layer
fn is_stall(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::TimedOut
        || error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<io::Error>())
            .is_some_and(|inner| inner.kind() == io::ErrorKind::TimedOut)
}

#[async_trait]
impl TrackResolver for MediaResolver {
    async fn resolve(&self, url: &str, streaming: bool) -> Result<ResolvedTrack, ResolveError> {
        self.validate(url)?;

        let key = CacheKey::for_url(url);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        if let Some(hit) = self.cache.lookup(url).await? {
            info!(url, title = %hit.metadata.title, "Serving track from cache");
            return Ok(ResolvedTrack {
                source_url: url.to_string(),
                title: hit.metadata.title,
                handle: PlayableHandle::LocalFile(hit.path.clone()),
                cache_path: Some(hit.path),
                from_cache: true,
                duration: None,
            });
        }

        let download = !streaming && self.cache.is_enabled();
        info!(url, download, extractor = self.extractor.name(), "Extracting media");
        let info = self.extractor.extract_info(url, download).await?.into_playable()?;

        let title = if info.title.is_empty() {
            url.to_string()
        } else {
            info.title.clone()
        };
        let duration = info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        if !download {
            let handle = match (info.direct_url, info.local_path) {
                (Some(direct_url), _) => PlayableHandle::Remote {
                    url: direct_url,
                    http_headers: info.http_headers,
                },
                (None, Some(path)) => PlayableHandle::LocalFile(path),
                (None, None) => return Err(ExtractorError::NoAudioFormat.into()),
            };
            return Ok(ResolvedTrack {
                source_url: url.to_string(),
                title,
                handle,
                cache_path: None,
                from_cache: false,
                duration,
            });
        }

        let metadata =
            CacheMetadata::new(url, title.clone()).with_extension_option(info.extension.clone());
        let path = match (&info.local_path, &info.direct_url) {
            (Some(local), _) => self.cache.adopt(url, local, metadata).await?,
            (None, Some(direct_url)) => {
                self.download(url, direct_url, &info.http_headers, metadata)
                    .await?
            }
            (None, None) => return Err(ExtractorError::NoAudioFormat.into()),
        };
        info!(url, %title, path = %path.display(), "Cached track");

        Ok(ResolvedTrack {
            source_url: url.to_string(),
            title,
            handle: PlayableHandle::LocalFile(path.clone()),
            cache_path: Some(path),
            from_cache: false,
            duration,
        })
    }
}
