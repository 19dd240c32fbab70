//! Google Calendar watch-channel client

use async_trait::async_trait;
use calsync_core::{CalendarProviderClient, WatchedCalendarChange, WatchedCalendarChangeResult};
use calsync_domain::constants::CHANNEL_KIND_WEB_HOOK;
use calsync_domain::{
    CalSyncError, EventDelta, EventStatus, ProviderChannelDetails, Result, SyncAction,
    Transparency,
};
use chrono::{Duration, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::errors::InfraError;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// How far back changed events are collected on a push notification.
const EVENTS_LOOKBACK_HOURS: i64 = 24;

/// How far ahead the free/busy refresh looks.
const FREEBUSY_LOOKAHEAD_HOURS: i64 = 24;

/// Google Calendar client bound to one resolved credential.
pub struct GoogleWatchClient {
    http: Client,
    api_base: String,
    access_token: String,
    callback_url: String,
    channel_token: String,
}

impl GoogleWatchClient {
    /// Create a client for an already-resolved bearer token.
    pub fn new(
        access_token: impl Into<String>,
        callback_url: impl Into<String>,
        channel_token: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            access_token: access_token.into(),
            callback_url: callback_url.into(),
            channel_token: channel_token.into(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn check_status(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        let message = format!("Google API error ({}): {}", status, error_text);

        Err(match status.as_u16() {
            401 | 403 => InfraError(CalSyncError::Auth(message)),
            _ => InfraError(CalSyncError::Network(message)),
        }
        .into())
    }

    async fn fetch_changed_events(&self, calendar_id: &str) -> Result<Vec<EventDelta>> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar_id);
        let updated_min = (Utc::now() - Duration::hours(EVENTS_LOOKBACK_HOURS)).to_rfc3339();

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("singleEvents", "true"),
                ("showDeleted", "true"),
                ("maxResults", "250"),
                ("updatedMin", updated_min.as_str()),
            ])
            .send()
            .await
            .map_err(InfraError::from)?;

        let response = Self::check_status(response).await?;

        let events: GoogleEventsResponse = response.json().await.map_err(|e| {
            InfraError(CalSyncError::InvalidInput(format!(
                "Failed to parse Google events response: {}",
                e
            )))
        })?;

        let mut deltas = Vec::with_capacity(events.items.len());
        for item in events.items {
            match item.into_delta() {
                Ok(delta) => deltas.push(delta),
                Err(err) => {
                    // One malformed item must not discard the whole delta.
                    warn!(error = %err, "skipping unparseable event from provider");
                }
            }
        }

        debug!(calendar_id, count = deltas.len(), "fetched changed events");
        Ok(deltas)
    }

    async fn refresh_free_busy(
        &self,
        change: &WatchedCalendarChange<'_>,
    ) -> Result<()> {
        let url = format!("{}/freeBusy", self.api_base);
        let now = Utc::now();

        let mut items: Vec<serde_json::Value> = change
            .selected_calendars
            .iter()
            .map(|c| json!({"id": c.external_id}))
            .collect();
        if items.is_empty() {
            items.push(json!({"id": change.calendar_id}));
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "timeMin": now.to_rfc3339(),
                "timeMax": (now + Duration::hours(FREEBUSY_LOOKAHEAD_HOURS)).to_rfc3339(),
                "items": items,
            }))
            .send()
            .await
            .map_err(InfraError::from)?;

        let response = Self::check_status(response).await?;

        let body: serde_json::Value = response.json().await.map_err(InfraError::from)?;
        let calendars = body.get("calendars").and_then(|c| c.as_object()).map_or(0, |c| c.len());
        debug!(calendars, "refreshed free/busy for watched calendars");
        Ok(())
    }
}

#[async_trait]
impl CalendarProviderClient for GoogleWatchClient {
    #[instrument(skip(self))]
    async fn watch_calendar(
        &self,
        external_calendar_id: &str,
    ) -> Result<ProviderChannelDetails> {
        let url = format!("{}/calendars/{}/events/watch", self.api_base, external_calendar_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "id": Uuid::new_v4().to_string(),
                "type": CHANNEL_KIND_WEB_HOOK,
                "address": self.callback_url,
                "token": self.channel_token,
            }))
            .send()
            .await
            .map_err(InfraError::from)?;

        let response = Self::check_status(response).await?;

        let channel: GoogleChannelResponse = response.json().await.map_err(|e| {
            InfraError(CalSyncError::InvalidInput(format!(
                "Failed to parse Google watch response: {}",
                e
            )))
        })?;

        // Google reports expiration as epoch milliseconds in a string.
        let expiration_ms = channel.expiration.parse::<i64>().map_err(|e| {
            CalSyncError::InvalidInput(format!(
                "Invalid channel expiration '{}': {}",
                channel.expiration, e
            ))
        })?;

        debug!(channel_id = %channel.id, "registered watch channel");

        Ok(ProviderChannelDetails {
            id: channel.id,
            kind: channel.kind.unwrap_or_else(|| "api#channel".to_string()),
            resource_id: channel.resource_id,
            resource_uri: channel.resource_uri,
            expiration: expiration_ms / 1000,
        })
    }

    #[instrument(skip(self))]
    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<()> {
        let url = format!("{}/channels/stop", self.api_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({"id": channel_id, "resourceId": resource_id}))
            .send()
            .await
            .map_err(InfraError::from)?;

        Self::check_status(response).await?;
        debug!(channel_id, "stopped watch channel");
        Ok(())
    }

    #[instrument(skip(self, change), fields(calendar_id = %change.calendar_id))]
    async fn on_watched_calendar_change(
        &self,
        change: WatchedCalendarChange<'_>,
    ) -> Result<WatchedCalendarChangeResult> {
        debug!(
            sync_actions = ?change.sync_actions,
            selected_calendars = change.selected_calendars.len(),
            "handling watched calendar change"
        );

        if change.sync_actions.contains(&SyncAction::AvailabilityCache) {
            self.refresh_free_busy(&change).await?;
        }

        let events_to_sync = if change.sync_actions.contains(&SyncAction::EventsSync) {
            Some(self.fetch_changed_events(change.calendar_id).await?)
        } else {
            None
        };

        Ok(WatchedCalendarChangeResult { events_to_sync })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleChannelResponse {
    id: String,
    resource_id: String,
    resource_uri: String,
    expiration: String,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    transparency: Option<String>,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    updated: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl GoogleCalendarEvent {
    fn into_delta(self) -> Result<EventDelta> {
        let status = match self.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };

        let transparency = match self.transparency.as_deref() {
            Some("transparent") => Transparency::Transparent,
            _ => Transparency::Opaque,
        };

        // Cancelled deltas omit their times; they only exist to tombstone
        // the cached row until cleanup.
        let start_ts = self.start.as_ref().map(parse_event_time).transpose()?.unwrap_or(0);
        let end_ts = self.end.as_ref().map(parse_event_time).transpose()?.unwrap_or(start_ts);

        let payload = serde_json::to_value(&self)
            .map_err(|e| CalSyncError::Internal(format!("failed to re-encode event: {e}")))?;

        Ok(EventDelta {
            provider_event_id: self.id,
            summary: self.summary,
            start_ts,
            end_ts,
            status,
            transparency,
            payload,
        })
    }
}

fn parse_event_time(time: &GoogleEventTime) -> Result<i64> {
    if let Some(ref date_time) = time.date_time {
        return chrono::DateTime::parse_from_rfc3339(date_time)
            .map(|dt| dt.with_timezone(&Utc).timestamp())
            .map_err(|e| {
                CalSyncError::InvalidInput(format!("Invalid event timestamp '{date_time}': {e}"))
            });
    }

    if let Some(ref date) = time.date {
        let midnight = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| {
                CalSyncError::InvalidInput(format!("Invalid all-day date '{date}': {e}"))
            })?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| {
                CalSyncError::InvalidInput(format!(
                    "Invalid all-day date '{date}': could not derive midnight"
                ))
            })?;
        return Ok(midnight.and_utc().timestamp());
    }

    Err(CalSyncError::InvalidInput("event time carries neither dateTime nor date".into()))
}

#[cfg(test)]
mod tests {
    use calsync_domain::SelectedCalendar;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> GoogleWatchClient {
        GoogleWatchClient::new(
            "ya29.test",
            "https://example.com/api/webhook/google-calendar",
            "shared-secret",
        )
        .with_api_base(server.uri())
    }

    #[tokio::test]
    async fn watch_calendar_parses_channel_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events/watch"))
            .and(body_partial_json(json!({
                "type": "web_hook",
                "address": "https://example.com/api/webhook/google-calendar",
                "token": "shared-secret",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "api#channel",
                "id": "chan-1",
                "resourceId": "res-1",
                "resourceUri": "https://www.googleapis.com/calendar/v3/calendars/primary/events",
                "expiration": "1900000000000"
            })))
            .mount(&server)
            .await;

        let details = client(&server).watch_calendar("primary").await.unwrap();

        assert_eq!(details.id, "chan-1");
        assert_eq!(details.resource_id, "res-1");
        assert_eq!(details.expiration, 1_900_000_000);
        assert_eq!(details.kind, "api#channel");
    }

    #[tokio::test]
    async fn unauthorized_watch_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events/watch"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).watch_calendar("primary").await.unwrap_err();
        assert!(matches!(err, CalSyncError::Auth(_)));
    }

    #[tokio::test]
    async fn events_sync_action_fetches_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "evt-1",
                        "status": "confirmed",
                        "summary": "Standup",
                        "start": {"dateTime": "2026-08-07T09:00:00Z"},
                        "end": {"dateTime": "2026-08-07T09:15:00Z"}
                    },
                    {
                        "id": "evt-2",
                        "status": "cancelled"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .on_watched_calendar_change(WatchedCalendarChange {
                calendar_id: "primary",
                sync_actions: &[SyncAction::EventsSync],
                selected_calendars: &[],
            })
            .await
            .unwrap();

        let deltas = result.events_to_sync.unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].provider_event_id, "evt-1");
        assert_eq!(deltas[0].status, EventStatus::Confirmed);
        assert!(deltas[0].start_ts > 0);
        assert_eq!(deltas[1].status, EventStatus::Cancelled);
    }

    #[tokio::test]
    async fn availability_cache_action_refreshes_free_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/freeBusy"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"calendars": {"primary": {}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let selected = SelectedCalendar {
            id: "sc-1".into(),
            user_id: 7,
            credential_id: Some(3),
            external_id: "primary".into(),
            integration: calsync_domain::ProviderType::Google,
            channel_id: Some("chan-1".into()),
            channel_kind: None,
            channel_resource_id: None,
            channel_resource_uri: None,
            channel_expiration: None,
        };

        let result = client(&server)
            .on_watched_calendar_change(WatchedCalendarChange {
                calendar_id: "primary",
                sync_actions: &[SyncAction::AvailabilityCache],
                selected_calendars: &[selected],
            })
            .await
            .unwrap();

        // The subscribe handshake carries no delta.
        assert!(result.events_to_sync.is_none());
    }

    #[test]
    fn all_day_dates_parse_to_midnight() {
        let ts = parse_event_time(&GoogleEventTime {
            date_time: None,
            date: Some("2026-08-07".to_string()),
        })
        .unwrap();
        assert_eq!(ts % 86_400, 0);
    }
}
