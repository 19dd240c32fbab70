//! Push notification types
//!
//! Notifications are ephemeral: they are parsed from provider headers,
//! classified, and never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CalSyncError;

/// Provider-supplied reason a push notification fired.
///
/// `Sync` is the initial subscribe handshake and carries no delta; `Exists`
/// means the resource changed; `NotFound` means it was deleted. No ordering
/// is guaranteed across notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Sync,
    Exists,
    NotFound,
}

impl ResourceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Exists => "exists",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sync" => Ok(Self::Sync),
            "exists" => Ok(Self::Exists),
            "not_found" => Ok(Self::NotFound),
            other => Err(CalSyncError::InvalidInput(format!(
                "unknown resource state: {other}"
            ))),
        }
    }
}

/// A provider push notification, parsed from request headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    pub channel_id: String,
    pub resource_id: String,
    /// Shared secret echoed back by the provider; verified against
    /// configuration before anything else happens.
    pub channel_token: String,
    pub message_number: String,
    pub resource_state: ResourceState,
    pub resource_uri: String,
    /// Provider-formatted expiration timestamp, e.g.
    /// `Sat, 22 Mar 2025 19:14:43 GMT`.
    pub channel_expiration: String,
}

/// Sync work derived from one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    AvailabilityCache,
    EventsSync,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AvailabilityCache => "availability-cache",
            Self::EventsSync => "events-sync",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
