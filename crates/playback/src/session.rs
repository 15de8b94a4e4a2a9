//! Registry of playback sessions, one per guild.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::coordinator::{CoordinatorHandle, PlaybackCoordinator};
use crate::events::SessionEvent;
use crate::resolver::TrackResolver;
use crate::transport::TransportFactory;

/// Identifier of a playback session (a guild)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Hands out coordinator handles, spawning sessions on first use.
///
/// Sessions share the resolver (and therefore the cache) and publish to one
/// event channel.
pub struct SessionManager {
    config: PlaybackConfig,
    resolver: Arc<dyn TrackResolver>,
    transports: Arc<dyn TransportFactory>,
    events: broadcast::Sender<SessionEvent>,
    sessions: Mutex<FxHashMap<SessionId, CoordinatorHandle>>,
}

impl SessionManager {
    pub fn new(
        config: PlaybackConfig,
        resolver: Arc<dyn TrackResolver>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            config,
            resolver,
            transports,
            events,
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Handle of `id`, spawning the session if it does not exist yet.
    /// Must be called from within a tokio runtime.
    pub fn session(&self, id: &SessionId) -> CoordinatorHandle {
        let mut sessions = self.sessions.lock();
        if let Some(handle) = sessions.get(id) {
            if !handle.is_closed() {
                return handle.clone();
            }
            warn!(session = %id, "Session coordinator exited, starting a new one");
        }

        info!(session = %id, "Starting playback session");
        let handle = PlaybackCoordinator::spawn(
            id.clone(),
            self.config.clone(),
            self.resolver.clone(),
            self.transports.create(id),
            self.events.clone(),
        );
        sessions.insert(id.clone(), handle.clone());
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<CoordinatorHandle> {
        self.sessions
            .lock()
            .get(id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Leave every session and forget it
    pub async fn shutdown(&self) {
        let handles: Vec<CoordinatorHandle> =
            self.sessions.lock().drain().map(|(_, handle)| handle).collect();

        for handle in handles {
            if let Err(e) = handle.leave().await {
                debug!(session = %handle.session(), error = %e, "Session left during shutdown");
            }
        }
    }
}
