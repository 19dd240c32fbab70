//! Port interfaces for the cached event store and its collaborators

use async_trait::async_trait;
use calsync_domain::{
    CachedEvent, CachedEventParams, CalSyncError, DownstreamApp, EventDelta, Result,
};

/// Persistent cache of provider events.
#[async_trait]
pub trait CachedEventRepository: Send + Sync {
    /// Idempotent upsert keyed by (subscription, provider event). On
    /// conflict the row is fully overwritten and `updated_at` bumped.
    async fn upsert_event(&self, params: &CachedEventParams) -> Result<()>;

    /// Applies a batch independently per event: every event is attempted,
    /// and the first failure is re-raised once the batch has been issued.
    async fn bulk_upsert_events(&self, events: &[CachedEventParams]) -> Result<()>;

    /// Non-cancelled, opaque events overlapping `[start_ts, end_ts)` that
    /// have not already ended, ordered by start ascending. Overlap is
    /// three-way: starts inside the range, ends inside the range, or spans
    /// the entire range.
    async fn get_events_for_availability(
        &self,
        subscription_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<CachedEvent>>;

    /// Remove one event after an explicit provider deletion signal.
    async fn delete_event(&self, subscription_id: &str, provider_event_id: &str) -> Result<()>;

    /// Standing retention policy: deletes cancelled events ended more than
    /// 24 hours ago, and any event that has already ended regardless of
    /// status. Returns the number of rows removed.
    async fn cleanup_old_events(&self) -> Result<usize>;
}

/// Downstream event-sync pipeline (external collaborator).
#[async_trait]
pub trait DownstreamSync: Send + Sync {
    async fn sync_downstream(&self, events: &[EventDelta], app: &DownstreamApp) -> Result<()>;
}

/// Error-tracking collaborator notified of repository failures.
///
/// Wired in as a decorator around repository ports rather than called inline
/// at each failure site.
pub trait ErrorTracker: Send + Sync {
    fn capture(&self, error: &CalSyncError, context: &str);
}
