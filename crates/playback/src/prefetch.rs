//! Background resolution of the next queue entry.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::resolver::TrackResolver;
use crate::track::ResolvedTrack;

/// At most one in-flight resolution, tagged with the URL it resolves.
///
/// The tag is compared against the queue head when the result is consumed;
/// a result for anything else is thrown away. Discarded tasks are detached,
/// not aborted, so a download in progress still lands in the cache.
#[derive(Default)]
pub(crate) enum PrefetchSlot {
    #[default]
    Empty,
    Pending {
        url: String,
        task: JoinHandle<Result<ResolvedTrack, ResolveError>>,
    },
}

impl PrefetchSlot {
    pub fn target(&self) -> Option<&str> {
        match self {
            PrefetchSlot::Empty => None,
            PrefetchSlot::Pending { url, .. } => Some(url),
        }
    }

    pub fn is_for(&self, url: &str) -> bool {
        self.target() == Some(url)
    }

    /// Start resolving `url`, replacing whatever the slot held
    pub fn start(&mut self, url: &str, resolver: Arc<dyn TrackResolver>, streaming: bool) {
        if let PrefetchSlot::Pending { url: previous, .. } = self {
            debug!(url = %previous, "Discarding prefetch");
        }
        debug!(url, "Prefetching next track");

        let target = url.to_string();
        let task = tokio::spawn(async move { resolver.resolve(&target, streaming).await });
        *self = PrefetchSlot::Pending {
            url: url.to_string(),
            task,
        };
    }

    pub fn clear(&mut self) {
        if let PrefetchSlot::Pending { url, .. } = std::mem::take(self) {
            debug!(%url, "Discarding prefetch");
        }
    }

    /// Take the result for `head`, waiting for the task if needed.
    ///
    /// Returns `None` when the slot was empty, tagged with another URL, or the
    /// task died; the caller resolves synchronously in that case.
    pub async fn take_for(&mut self, head: &str) -> Option<Result<ResolvedTrack, ResolveError>> {
        match std::mem::take(self) {
            PrefetchSlot::Empty => None,
            PrefetchSlot::Pending { url, task } if url == head => match task.await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(%url, error = %e, "Prefetch task failed, resolving synchronously");
                    None
                }
            },
            PrefetchSlot::Pending { url, .. } => {
                debug!(stale = %url, head, "Prefetch does not match queue head");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedResolver;

    #[tokio::test]
    async fn empty_slot_yields_nothing() {
        let mut slot = PrefetchSlot::default();
        assert!(slot.take_for("a").await.is_none());
    }

    #[tokio::test]
    async fn matching_result_is_consumed_once() {
        let resolver = Arc::new(ScriptedResolver::new());
        let mut slot = PrefetchSlot::default();
        slot.start("a", resolver.clone(), false);
        assert!(slot.is_for("a"));

        let track = slot.take_for("a").await.unwrap().unwrap();
        assert_eq!(track.source_url, "a");
        assert!(slot.target().is_none());
        assert!(slot.take_for("a").await.is_none());
        assert_eq!(resolver.calls_for("a"), 1);
    }

    #[tokio::test]
    async fn stale_result_is_discarded() {
        let resolver = Arc::new(ScriptedResolver::new());
        let mut slot = PrefetchSlot::default();
        slot.start("a", resolver, false);

        assert!(slot.take_for("b").await.is_none());
        assert!(slot.target().is_none());
    }

    #[tokio::test]
    async fn failures_are_handed_to_the_caller() {
        let resolver = Arc::new(ScriptedResolver::new().failing("a"));
        let mut slot = PrefetchSlot::default();
        slot.start("a", resolver, false);

        assert!(matches!(slot.take_for("a").await, Some(Err(_))));
    }

    #[tokio::test]
    async fn restart_replaces_target() {
        let resolver = Arc::new(ScriptedResolver::new());
        let mut slot = PrefetchSlot::default();
        slot.start("a", resolver.clone(), false);
        slot.start("b", resolver, false);
        assert!(slot.is_for("b"));

        slot.clear();
        assert!(slot.target().is_none());
    }
}
