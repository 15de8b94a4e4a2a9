//! # Media Store
//!
//! A flat, file based store. Every entry is a blob named after its
//! [`CacheKey`] plus a `<key>.meta` JSON sidecar. Writes go to a uniquely
//! named temporary file first and are renamed into place, so readers never
//! observe a half written blob.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::types::{CacheConfig, CacheKey, CacheMetadata, CacheResult, CacheStats, CachedMedia};

const METADATA_EXTENSION: &str = "meta";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Clone)]
pub struct MediaCache {
    cache_dir: PathBuf,
    initialized: Arc<OnceCell<()>>,
    enabled: bool,
}

impl MediaCache {
    /// Create a new store for the configured directory.
    ///
    /// Nothing is touched on disk until the first operation.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache_dir: config.cache_dir,
            initialized: Arc::new(OnceCell::new()),
            enabled: config.enabled,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Create the cache directory, once
    pub async fn ensure_initialized(&self) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.initialized
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.cache_dir).await?;
                debug!(dir = ?self.cache_dir, "Initialized media cache directory");
                Ok::<(), io::Error>(())
            })
            .await?;

        Ok(())
    }

    /// Path of the blob for a key
    pub fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.blob_path(key).with_extension(METADATA_EXTENSION)
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{key}.{}.{TEMP_EXTENSION}", uuid::Uuid::new_v4().simple()))
    }

    /// Look up a source URL. Never touches the network.
    pub async fn lookup(&self, url: &str) -> CacheResult<Option<CachedMedia>> {
        if !self.enabled {
            return Ok(None);
        }

        self.ensure_initialized().await?;

        let key = CacheKey::for_url(url);
        let data_path = self.blob_path(&key);
        let meta_path = self.metadata_path(&key);

        let data_exists = fs::try_exists(&data_path).await?;
        let meta_exists = fs::try_exists(&meta_path).await?;

        if !data_exists || !meta_exists {
            return Ok(None);
        }

        let metadata_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to read cache metadata file");
                return Ok(None);
            }
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&metadata_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to parse cache metadata");

                // Drop the broken entry without holding up the caller
                tokio::spawn(async move {
                    let _ = fs::remove_file(&data_path).await;
                    let _ = fs::remove_file(&meta_path).await;
                });

                return Ok(None);
            }
        };

        debug!(%key, title = %metadata.title, "Cache hit");
        Ok(Some(CachedMedia {
            path: data_path,
            metadata,
        }))
    }

    /// Store an in-memory blob for a source URL
    pub async fn store(
        &self,
        url: &str,
        data: Bytes,
        metadata: CacheMetadata,
    ) -> CacheResult<PathBuf> {
        self.store_stream(url, futures::stream::once(async { Ok::<_, io::Error>(data) }), metadata)
            .await
    }

    /// Store a blob delivered as a byte stream (e.g. an HTTP body)
    pub async fn store_stream<S, E>(
        &self,
        url: &str,
        stream: S,
        mut metadata: CacheMetadata,
    ) -> CacheResult<PathBuf>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.enabled {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "media cache is disabled",
            ));
        }

        self.ensure_initialized().await?;

        let key = CacheKey::for_url(url);
        let temp_data_path = self.temp_path(&key);

        let written = match write_stream(&temp_data_path, stream).await {
            Ok(written) => written,
            Err(e) => {
                warn!(path = ?temp_data_path, error = %e, "Failed to write cache data file");
                let _ = fs::remove_file(&temp_data_path).await;
                return Err(e);
            }
        };

        metadata.size = written;
        self.commit(&key, &temp_data_path, &metadata).await
    }

    /// Move an already downloaded file into the store
    pub async fn adopt(
        &self,
        url: &str,
        file: &Path,
        mut metadata: CacheMetadata,
    ) -> CacheResult<PathBuf> {
        if !self.enabled {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "media cache is disabled",
            ));
        }

        self.ensure_initialized().await?;

        let key = CacheKey::for_url(url);
        let temp_data_path = self.temp_path(&key);

        // A plain rename fails across file systems; fall back to copying
        if let Err(e) = fs::rename(file, &temp_data_path).await {
            debug!(from = ?file, error = %e, "Rename into cache failed, copying instead");
            if let Err(e) = fs::copy(file, &temp_data_path).await {
                let _ = fs::remove_file(&temp_data_path).await;
                return Err(e);
            }
            let _ = fs::remove_file(file).await;
        }

        metadata.size = fs::metadata(&temp_data_path).await?.len();
        self.commit(&key, &temp_data_path, &metadata).await
    }

    /// Publish a fully written temporary blob together with its metadata
    async fn commit(
        &self,
        key: &CacheKey,
        temp_data_path: &Path,
        metadata: &CacheMetadata,
    ) -> CacheResult<PathBuf> {
        let data_path = self.blob_path(key);
        let meta_path = self.metadata_path(key);
        let temp_meta_path = self.temp_path(key);

        let metadata_json = match serde_json::to_vec(metadata) {
            Ok(json) => json,
            Err(e) => {
                let _ = fs::remove_file(temp_data_path).await;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to serialize metadata: {e}"),
                ));
            }
        };

        if let Err(e) = fs::write(&temp_meta_path, &metadata_json).await {
            warn!(path = ?temp_meta_path, error = %e, "Failed to write cache metadata file");
            let _ = fs::remove_file(temp_data_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(temp_data_path, &data_path).await {
            warn!(
                from = ?temp_data_path,
                to = ?data_path,
                error = %e,
                "Failed to rename temporary data file"
            );
            let _ = fs::remove_file(temp_data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            warn!(
                from = ?temp_meta_path,
                to = ?meta_path,
                error = %e,
                "Failed to rename temporary metadata file"
            );
            // Blob without metadata is never served, remove it
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(%key, size = metadata.size, "Stored media in cache");
        Ok(data_path)
    }

    /// Remove the entry for a source URL, if any
    pub async fn remove(&self, url: &str) -> CacheResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.ensure_initialized().await?;

        let key = CacheKey::for_url(url);
        let data_path = self.blob_path(&key);
        let meta_path = self.metadata_path(&key);

        let data_result = fs::remove_file(&data_path).await;
        let meta_result = fs::remove_file(&meta_path).await;

        match (data_result, meta_result) {
            (Err(e), _) if e.kind() != io::ErrorKind::NotFound => {
                warn!(path = ?data_path, error = %e, "Failed to remove cache data file");
                Err(e)
            }
            (_, Err(e)) if e.kind() != io::ErrorKind::NotFound => {
                warn!(path = ?meta_path, error = %e, "Failed to remove cache metadata file");
                Err(e)
            }
            _ => Ok(()),
        }
    }

    /// Remove every entry, returns how many files were deleted
    pub async fn clear(&self) -> CacheResult<usize> {
        if !self.enabled {
            return Ok(0);
        }

        self.ensure_initialized().await?;

        let mut entries = fs::read_dir(&self.cache_dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %e, "Failed to remove cache file");
            } else {
                removed += 1;
            }
        }

        debug!(count = removed, "Cleared cache entries");
        Ok(removed)
    }

    /// Count complete entries and the bytes their blobs occupy
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = CacheStats::default();
        if !self.enabled || !fs::try_exists(&self.cache_dir).await? {
            return Ok(stats);
        }

        let mut entries = fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }
            if let Ok(blob) = fs::metadata(path.with_extension("")).await {
                stats.entries += 1;
                stats.total_bytes += blob.len();
            }
        }

        Ok(stats)
    }
}

async fn write_stream<S, E>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut file = fs::File::create(path).await?;
    let mut stream = std::pin::pin!(stream);
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(io::Error::other)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
