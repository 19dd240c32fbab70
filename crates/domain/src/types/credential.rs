//! Credential types
//!
//! Token lifecycle (OAuth flows, refresh) is owned by an external system;
//! this is the minimal shape the resolver surfaces to the sync engine.

use serde::{Deserialize, Serialize};

use super::subscription::ProviderType;

/// An authenticated calendar credential resolved for a cache operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarCredential {
    pub id: i64,
    pub provider_type: ProviderType,
    pub account_email: String,
    pub access_token: String,
    /// Delegation credentials can be disabled out from under a channel,
    /// which is why resolution may legitimately return nothing.
    pub delegated: bool,
}
