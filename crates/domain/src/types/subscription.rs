//! Subscription and legacy selected-calendar types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CalSyncError;

/// Lifecycle status of a provider push subscription.
///
/// `Pending` rows exist locally but are not yet confirmed with the provider;
/// `Active` rows carry full channel details; `Inactive` rows are kept as an
/// audit trail after teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(CalSyncError::InvalidInput(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// Supported calendar providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Google,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }

    /// App identifier used when forwarding events downstream.
    pub fn app_type(self) -> &'static str {
        match self {
            Self::Google => "google_calendar",
        }
    }

    /// Human-readable app name used when forwarding events downstream.
    pub fn app_name(self) -> &'static str {
        match self {
            Self::Google => "Google Calendar",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(Self::Google),
            other => Err(CalSyncError::InvalidInput(format!("unknown provider: {other}"))),
        }
    }
}

/// Identity of the app a downstream sync is performed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamApp {
    #[serde(rename = "type")]
    pub app_type: String,
    pub name: String,
}

impl DownstreamApp {
    pub fn for_provider(provider: ProviderType) -> Self {
        Self { app_type: provider.app_type().to_string(), name: provider.app_name().to_string() }
    }
}

/// Direction of the most recent sync for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    Upstream,
    Downstream,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "UPSTREAM",
            Self::Downstream => "DOWNSTREAM",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "UPSTREAM" => Ok(Self::Upstream),
            "DOWNSTREAM" => Ok(Self::Downstream),
            other => Err(CalSyncError::InvalidInput(format!(
                "unknown sync direction: {other}"
            ))),
        }
    }
}

/// Provider-side channel details returned by a successful watch call.
///
/// `expiration` is epoch seconds; providers report milliseconds on the wire
/// and the integration layer converts before these details reach the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderChannelDetails {
    pub id: String,
    pub kind: String,
    pub resource_id: String,
    pub resource_uri: String,
    pub expiration: i64,
}

/// One provider-side push channel bound to one external calendar.
///
/// At most one row may be ACTIVE per (external_calendar_id, provider_type)
/// pair; the persistence layer enforces this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub credential_id: i64,
    pub external_calendar_id: String,
    pub provider_type: ProviderType,
    pub status: SubscriptionStatus,
    pub provider_subscription_id: Option<String>,
    pub provider_subscription_kind: Option<String>,
    pub provider_resource_id: Option<String>,
    pub provider_resource_uri: Option<String>,
    pub provider_expiration: Option<i64>,
    pub activated_at: Option<i64>,
    pub last_sync_at: Option<i64>,
    pub last_synced_down_at: Option<i64>,
    pub last_sync_direction: Option<SyncDirection>,
    pub watch_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    /// Channel details when every provider field is populated.
    pub fn channel_details(&self) -> Option<ProviderChannelDetails> {
        Some(ProviderChannelDetails {
            id: self.provider_subscription_id.clone()?,
            kind: self.provider_subscription_kind.clone()?,
            resource_id: self.provider_resource_id.clone()?,
            resource_uri: self.provider_resource_uri.clone()?,
            expiration: self.provider_expiration?,
        })
    }
}

/// Fields required to create (or find) a subscription row.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub credential_id: i64,
    pub external_calendar_id: String,
    pub provider_type: ProviderType,
    pub status: SubscriptionStatus,
    /// Channel details when materializing an already-confirmed channel
    /// (e.g. from a legacy record). `None` for PENDING rows.
    pub channel: Option<ProviderChannelDetails>,
}

/// Legacy per-calendar record that may independently carry channel fields.
///
/// Migration artifact: before the subscription table existed, channel state
/// lived directly on the user's selected calendar. Both locations must agree
/// on the external calendar they point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedCalendar {
    pub id: String,
    pub user_id: i64,
    pub credential_id: Option<i64>,
    pub external_id: String,
    pub integration: ProviderType,
    pub channel_id: Option<String>,
    pub channel_kind: Option<String>,
    pub channel_resource_id: Option<String>,
    pub channel_resource_uri: Option<String>,
    pub channel_expiration: Option<i64>,
}

impl SelectedCalendar {
    /// True when the record carries any channel registration at all.
    pub fn has_channel(&self) -> bool {
        self.channel_id.is_some()
    }

    /// Channel details when the legacy record is complete enough to reuse.
    pub fn channel_details(&self) -> Option<ProviderChannelDetails> {
        Some(ProviderChannelDetails {
            id: self.channel_id.clone()?,
            kind: self.channel_kind.clone()?,
            resource_id: self.channel_resource_id.clone()?,
            resource_uri: self.channel_resource_uri.clone()?,
            expiration: self.channel_expiration?,
        })
    }
}
