//! # Media Extract
//!
//! Turns a web page URL (or a search query) into playable media
//! information: title, a direct media URL and the HTTP headers needed to
//! fetch it.

mod error;
mod extractor;
mod media_info;
pub mod ytdlp;

pub use error::ExtractorError;
pub use extractor::MediaExtractor;
pub use media_info::MediaInfo;
pub use ytdlp::{YtDlpConfig, YtDlpExtractor};
