//! Shared application state

use std::sync::Arc;

use calsync_core::WebhookService;
use calsync_infra::DbManager;

/// State shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub webhook: Arc<WebhookService>,
    pub db: Arc<DbManager>,
}

impl AppState {
    pub fn new(webhook: Arc<WebhookService>, db: Arc<DbManager>) -> Self {
        Self { webhook, db }
    }
}
