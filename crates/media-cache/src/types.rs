//! # Cache Types
//!
//! This module defines common types used across the media store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Content-addressed key for a source URL.
///
/// The key is the lowercase hex SHA-256 digest of the URL, so the same URL
/// maps to the same file across runs and processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a source URL
    pub fn for_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = hasher.finalize();
        Self(format!("{hash:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored next to every cached blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// URL the blob was resolved from
    pub source_url: String,
    /// Human readable title reported by the extractor
    pub title: String,
    /// Original container extension (e.g. "webm", "m4a")
    pub extension: Option<String>,
    /// Size of the blob in bytes, filled in when the blob is written
    pub size: u64,
    /// When the blob was cached (unix seconds)
    pub cached_at: u64,
}

impl CacheMetadata {
    /// Create new metadata for a resource
    pub fn new(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            extension: None,
            size: 0,
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Set the container extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Set the container extension as an Option
    pub fn with_extension_option(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }
}

/// Configuration for the media store
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Directory holding blobs and their metadata
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from("cache"),
        }
    }
}

impl CacheConfig {
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A cache hit
#[derive(Debug, Clone)]
pub struct CachedMedia {
    /// Path of the cached blob
    pub path: PathBuf,
    pub metadata: CacheMetadata,
}

/// Aggregate numbers for the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Result of a cache operation
pub type CacheResult<T> = std::result::Result<T, std::io::Error>;
