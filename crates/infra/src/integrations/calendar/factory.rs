//! Provider client factory

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{CalendarClientFactory, CalendarProviderClient};
use calsync_domain::{CalendarCredential, ProviderType, Result};
use tracing::debug;

use super::google::GoogleWatchClient;

/// Builds a provider client for a resolved credential.
pub struct GoogleClientFactory {
    callback_url: String,
    channel_token: String,
    api_base: Option<String>,
}

impl GoogleClientFactory {
    pub fn new(callback_url: impl Into<String>, channel_token: impl Into<String>) -> Self {
        Self { callback_url: callback_url.into(), channel_token: channel_token.into(), api_base: None }
    }

    /// Override the API base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }
}

#[async_trait]
impl CalendarClientFactory for GoogleClientFactory {
    async fn client_for(
        &self,
        credential: &CalendarCredential,
    ) -> Result<Option<Arc<dyn CalendarProviderClient>>> {
        match credential.provider_type {
            ProviderType::Google => {
                let mut client = GoogleWatchClient::new(
                    credential.access_token.clone(),
                    self.callback_url.clone(),
                    self.channel_token.clone(),
                );
                if let Some(ref api_base) = self.api_base {
                    client = client.with_api_base(api_base.clone());
                }
                debug!(credential_id = credential.id, "built google calendar client");
                Ok(Some(Arc::new(client)))
            }
        }
    }
}
