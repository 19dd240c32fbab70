//! Error-tracking decorator around repository ports.
//!
//! Repository failures must reach the error-tracking collaborator and then
//! propagate to the caller. Wrapping the repository keeps capture out of
//! every call site.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{CachedEventRepository, ErrorTracker};
use calsync_domain::{CachedEvent, CachedEventParams, Result};

/// Decorator that reports every failure of the wrapped event repository to
/// the error tracker before re-raising it.
pub struct TrackedEventRepository {
    inner: Arc<dyn CachedEventRepository>,
    tracker: Arc<dyn ErrorTracker>,
}

impl TrackedEventRepository {
    pub fn new(inner: Arc<dyn CachedEventRepository>, tracker: Arc<dyn ErrorTracker>) -> Self {
        Self { inner, tracker }
    }

    fn track<T>(&self, context: &'static str, result: Result<T>) -> Result<T> {
        if let Err(ref err) = result {
            self.tracker.capture(err, context);
        }
        result
    }
}

#[async_trait]
impl CachedEventRepository for TrackedEventRepository {
    async fn upsert_event(&self, params: &CachedEventParams) -> Result<()> {
        let result = self.inner.upsert_event(params).await;
        self.track("upsert_event", result)
    }

    async fn bulk_upsert_events(&self, events: &[CachedEventParams]) -> Result<()> {
        let result = self.inner.bulk_upsert_events(events).await;
        self.track("bulk_upsert_events", result)
    }

    async fn get_events_for_availability(
        &self,
        subscription_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<CachedEvent>> {
        let result =
            self.inner.get_events_for_availability(subscription_id, start_ts, end_ts).await;
        self.track("get_events_for_availability", result)
    }

    async fn delete_event(&self, subscription_id: &str, provider_event_id: &str) -> Result<()> {
        let result = self.inner.delete_event(subscription_id, provider_event_id).await;
        self.track("delete_event", result)
    }

    async fn cleanup_old_events(&self) -> Result<usize> {
        let result = self.inner.cleanup_old_events().await;
        self.track("cleanup_old_events", result)
    }
}

#[cfg(test)]
mod tests {
    use calsync_core::testing::{MockCachedEventRepository, RecordingErrorTracker};
    use calsync_domain::{EventStatus, Transparency};

    use super::*;

    fn params() -> CachedEventParams {
        CachedEventParams {
            subscription_id: "sub-1".to_string(),
            provider_event_id: "evt-1".to_string(),
            summary: None,
            start_ts: 100,
            end_ts: 200,
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn failures_are_captured_and_reraised() {
        let tracker = Arc::new(RecordingErrorTracker::new());
        let repo = TrackedEventRepository::new(
            Arc::new(MockCachedEventRepository::new().fail_upserts()),
            tracker.clone(),
        );

        let err = repo.upsert_event(&params()).await.unwrap_err();
        assert!(matches!(err, calsync_domain::CalSyncError::Database(_)));

        let captured = tracker.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].1, "upsert_event");
    }

    #[tokio::test]
    async fn successes_are_not_captured() {
        let tracker = Arc::new(RecordingErrorTracker::new());
        let repo =
            TrackedEventRepository::new(Arc::new(MockCachedEventRepository::new()), tracker.clone());

        repo.upsert_event(&params()).await.unwrap();
        assert!(tracker.captured().is_empty());
    }
}
