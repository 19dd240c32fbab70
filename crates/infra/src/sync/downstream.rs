//! Downstream event-sync forwarder
//!
//! Synced events belong to whatever pipeline consumes booking-relevant
//! changes (workflow triggers, notifications). That pipeline is an external
//! collaborator reached over HTTP; deployments without one fall back to the
//! logging sink.

use async_trait::async_trait;
use calsync_core::DownstreamSync;
use calsync_domain::{CalSyncError, DownstreamApp, EventDelta, Result};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use crate::errors::InfraError;

/// Forwards synced events to a configured HTTP endpoint.
#[derive(Debug)]
pub struct HttpDownstreamSync {
    http: Client,
    url: Url,
}

impl HttpDownstreamSync {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| CalSyncError::Config(format!("invalid downstream url '{url}': {e}")))?;
        Ok(Self { http: Client::new(), url })
    }
}

#[async_trait]
impl DownstreamSync for HttpDownstreamSync {
    #[instrument(skip(self, events), fields(count = events.len(), app = %app.app_type))]
    async fn sync_downstream(&self, events: &[EventDelta], app: &DownstreamApp) -> Result<()> {
        let response = self
            .http
            .post(self.url.clone())
            .json(&json!({
                "calendarEvents": events,
                "app": app,
            }))
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CalSyncError::Network(format!(
                "downstream sync endpoint returned {status}"
            )));
        }

        debug!("forwarded events downstream");
        Ok(())
    }
}

/// Logging sink used when no downstream endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDownstreamSync;

impl LogDownstreamSync {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DownstreamSync for LogDownstreamSync {
    async fn sync_downstream(&self, events: &[EventDelta], app: &DownstreamApp) -> Result<()> {
        info!(count = events.len(), app = %app.app_type, "no downstream endpoint configured; dropping synced events");
        Ok(())
    }
}
