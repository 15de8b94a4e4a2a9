use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("failed to launch extractor `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("extractor exited with {status}: {stderr}")]
    Process { status: String, stderr: String },
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("no audio format found")]
    NoAudioFormat,
    #[error("playlist has no entries")]
    EmptyPlaylist,
}
