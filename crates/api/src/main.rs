//! CalSync server entry point
//!
//! Assembles the repositories, services and schedulers, then serves the
//! webhook endpoint until shutdown.

use std::sync::Arc;

use anyhow::Context;
use calsync_api::{router, AppState};
use calsync_core::{
    CachedEventRepository, DownstreamSync, RenewalService, SubscriptionService, WebhookService,
};
use calsync_infra::config;
use calsync_infra::database::{
    DbManager, SqliteCachedEventRepository, SqliteCredentialRepository,
    SqliteSelectedCalendarRepository, SqliteSubscriptionRepository, TrackedEventRepository,
};
use calsync_infra::integrations::GoogleClientFactory;
use calsync_infra::scheduling::{
    CleanupScheduler, CleanupSchedulerConfig, RenewalScheduler, RenewalSchedulerConfig,
};
use calsync_infra::sync::{HttpDownstreamSync, LogDownstreamSync};
use calsync_infra::TracingErrorTracker;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::load().context("loading configuration")?;

    let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
    db.run_migrations().context("running database migrations")?;
    let pool = db.pool().clone();

    let subscriptions = Arc::new(SqliteSubscriptionRepository::new(pool.clone()));
    let selected_calendars = Arc::new(SqliteSelectedCalendarRepository::new(pool.clone()));
    let credentials = Arc::new(SqliteCredentialRepository::new(pool.clone()));
    let events: Arc<dyn CachedEventRepository> = Arc::new(TrackedEventRepository::new(
        Arc::new(SqliteCachedEventRepository::new(pool)),
        Arc::new(TracingErrorTracker::new()),
    ));

    let clients = Arc::new(GoogleClientFactory::new(
        config.webhook.callback_url.clone(),
        config.webhook.channel_token.clone(),
    ));

    let downstream: Arc<dyn DownstreamSync> = match config.downstream.url {
        Some(ref url) => Arc::new(HttpDownstreamSync::new(url)?),
        None => Arc::new(LogDownstreamSync::new()),
    };

    let webhook = Arc::new(WebhookService::new(
        subscriptions.clone(),
        selected_calendars.clone(),
        events.clone(),
        credentials.clone(),
        clients.clone(),
        downstream,
        config.webhook.channel_token.clone(),
    ));

    let reconciliation =
        Arc::new(SubscriptionService::new(subscriptions.clone(), selected_calendars));
    let renewal =
        Arc::new(RenewalService::new(reconciliation, subscriptions, credentials, clients));

    let mut renewal_scheduler = if config.renewal.enabled {
        let mut scheduler = RenewalScheduler::with_config(
            RenewalSchedulerConfig {
                cron_expression: config.renewal.cron_expression.clone(),
                batch_size: config.renewal.batch_size,
                ..Default::default()
            },
            renewal,
        )?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        info!("subscription renewal scheduler disabled");
        None
    };

    let mut cleanup_scheduler = if config.cleanup.enabled {
        let mut scheduler = CleanupScheduler::with_config(
            CleanupSchedulerConfig {
                cron_expression: config.cleanup.cron_expression.clone(),
                ..Default::default()
            },
            events,
        )?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        info!("event cache cleanup scheduler disabled");
        None
    };

    let state = AppState::new(webhook, db);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "calsync server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(ref mut scheduler) = renewal_scheduler {
        scheduler.stop().await?;
    }
    if let Some(ref mut scheduler) = cleanup_scheduler {
        scheduler.stop().await?;
    }

    info!("calsync server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
