//! Busy-interval computation over the event cache

use std::sync::Arc;

use calsync_domain::{BusyInterval, CachedEvent, Result};

use crate::events::ports::CachedEventRepository;

/// Computes busy intervals for conflict detection from cached events.
pub struct AvailabilityService {
    events: Arc<dyn CachedEventRepository>,
}

impl AvailabilityService {
    pub fn new(events: Arc<dyn CachedEventRepository>) -> Self {
        Self { events }
    }

    /// Merged busy intervals for a subscription within `[start_ts, end_ts)`.
    ///
    /// The repository already filters to opaque, non-cancelled, not-yet-ended
    /// events; this coalesces overlapping and adjacent ones.
    pub async fn get_busy_times(
        &self,
        subscription_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<BusyInterval>> {
        let events =
            self.events.get_events_for_availability(subscription_id, start_ts, end_ts).await?;
        Ok(merge_busy_intervals(&events))
    }
}

/// Coalesce start-ordered events into non-overlapping busy intervals.
fn merge_busy_intervals(events: &[CachedEvent]) -> Vec<BusyInterval> {
    let mut merged: Vec<BusyInterval> = Vec::new();

    for event in events {
        match merged.last_mut() {
            Some(last) if event.start_ts <= last.end_ts => {
                last.end_ts = last.end_ts.max(event.end_ts);
            }
            _ => merged.push(BusyInterval { start_ts: event.start_ts, end_ts: event.end_ts }),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use calsync_domain::{EventStatus, Transparency};

    use super::*;

    fn event(start_ts: i64, end_ts: i64) -> CachedEvent {
        CachedEvent {
            id: format!("row-{start_ts}"),
            subscription_id: "sub-1".into(),
            provider_event_id: format!("evt-{start_ts}"),
            summary: None,
            start_ts,
            end_ts,
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
            payload: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn overlapping_events_are_merged() {
        let merged = merge_busy_intervals(&[event(100, 200), event(150, 300), event(400, 500)]);

        assert_eq!(
            merged,
            vec![
                BusyInterval { start_ts: 100, end_ts: 300 },
                BusyInterval { start_ts: 400, end_ts: 500 },
            ]
        );
    }

    #[test]
    fn adjacent_events_are_merged() {
        let merged = merge_busy_intervals(&[event(100, 200), event(200, 250)]);
        assert_eq!(merged, vec![BusyInterval { start_ts: 100, end_ts: 250 }]);
    }

    #[test]
    fn contained_events_do_not_shrink_the_interval() {
        let merged = merge_busy_intervals(&[event(100, 500), event(200, 300)]);
        assert_eq!(merged, vec![BusyInterval { start_ts: 100, end_ts: 500 }]);
    }

    #[test]
    fn empty_input_yields_no_intervals() {
        assert!(merge_busy_intervals(&[]).is_empty());
    }
}
