/// Configuration shared by every playback session
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Play the extractor's direct URL instead of downloading into the cache
    pub streaming: bool,
    /// Resolve the next queue entry while the current one plays
    pub prefetch: bool,
    /// Disconnect from the voice channel once the queue runs dry
    pub disconnect_when_idle: bool,
    /// Capacity of each session's request mailbox
    pub mailbox_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            streaming: false,
            prefetch: true,
            disconnect_when_idle: true,
            mailbox_capacity: 32,
            event_capacity: 256,
        }
    }
}

impl PlaybackConfig {
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_disconnect_when_idle(mut self, disconnect: bool) -> Self {
        self.disconnect_when_idle = disconnect;
        self
    }
}
