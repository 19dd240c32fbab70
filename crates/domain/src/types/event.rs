//! Cached event types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CalSyncError;

/// Provider event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "confirmed" => Ok(Self::Confirmed),
            "tentative" => Ok(Self::Tentative),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CalSyncError::InvalidInput(format!("unknown event status: {other}"))),
        }
    }
}

/// Whether an event blocks availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    Opaque,
    Transparent,
}

impl Transparency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::Transparent => "transparent",
        }
    }
}

impl FromStr for Transparency {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "opaque" => Ok(Self::Opaque),
            "transparent" => Ok(Self::Transparent),
            other => Err(CalSyncError::InvalidInput(format!("unknown transparency: {other}"))),
        }
    }
}

/// One provider event mirrored locally.
///
/// Identity is the (subscription_id, provider_event_id) composite; applying
/// the same delta twice leaves the row unchanged apart from `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEvent {
    pub id: String,
    pub subscription_id: String,
    pub provider_event_id: String,
    pub summary: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub status: EventStatus,
    pub transparency: Transparency,
    /// Raw provider payload, kept verbatim for downstream consumers.
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CachedEvent {
    /// Only opaque, non-cancelled events count toward busy computation.
    pub fn counts_toward_busy(&self) -> bool {
        self.transparency == Transparency::Opaque && self.status != EventStatus::Cancelled
    }
}

/// Parameters for an idempotent event upsert.
#[derive(Debug, Clone)]
pub struct CachedEventParams {
    pub subscription_id: String,
    pub provider_event_id: String,
    pub summary: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub status: EventStatus,
    pub transparency: Transparency,
    pub payload: serde_json::Value,
}

/// A changed event reported by the provider since the last known sync point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDelta {
    pub provider_event_id: String,
    pub summary: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub status: EventStatus,
    pub transparency: Transparency,
    pub payload: serde_json::Value,
}

impl EventDelta {
    /// Bind this delta to the subscription whose channel reported it.
    pub fn into_params(self, subscription_id: &str) -> CachedEventParams {
        CachedEventParams {
            subscription_id: subscription_id.to_string(),
            provider_event_id: self.provider_event_id,
            summary: self.summary,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            status: self.status,
            transparency: self.transparency,
            payload: self.payload,
        }
    }
}

/// Half-open busy interval used for conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start_ts: i64,
    pub end_ts: i64,
}
