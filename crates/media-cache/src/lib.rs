//! # Media Cache
//!
//! Content-addressed storage for resolved media. A source URL is hashed into
//! a [`CacheKey`]; the same key names the file on both the read and the
//! write path, so a track downloaded once is reused on every later request.

mod store;
mod types;

pub use store::MediaCache;
pub use types::{CacheConfig, CacheKey, CacheMetadata, CacheResult, CacheStats, CachedMedia};
