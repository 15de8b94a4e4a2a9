use media_extract::ExtractorError;
use thiserror::Error;

/// Problems with a user request. Reported back to the user, state is left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("{0} is not connected to a voice channel")]
    NotInVoiceChannel(String),
    #[error("the bot is not connected to a voice channel")]
    NotConnected,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("playback is not paused")]
    NotPaused,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

/// Failure to turn a queue entry into something playable.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractorError),
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("download stalled, no data for {0:?}")]
    Stalled(std::time::Duration),
    #[error("cache error: {0}")]
    Cache(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("voice transport is not connected")]
    NotConnected,
    #[error("failed to launch decoder `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoder error: {0}")]
    Decoder(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    UserInput(#[from] UserInputError),
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session {0} is closed")]
    SessionClosed(String),
}

impl PlaybackError {
    /// Whether the error is a notice for the user rather than a fault
    pub fn is_user_input(&self) -> bool {
        matches!(self, PlaybackError::UserInput(_))
    }
}
