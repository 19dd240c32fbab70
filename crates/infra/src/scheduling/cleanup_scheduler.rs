//! Event cache cleanup scheduler.
//!
//! Drives the standing retention policy: cancelled events ended more than a
//! day ago and any event that has already ended are purged on a cron
//! schedule. Same lifecycle rules as the renewal scheduler.

use std::sync::Arc;
use std::time::Duration;

use calsync_core::CachedEventRepository;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the cleanup scheduler.
#[derive(Debug, Clone)]
pub struct CleanupSchedulerConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Timeout applied to a single cleanup run.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for CleanupSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 * * * *".into(), // hourly
            job_timeout: Duration::from_secs(120),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Event cache cleanup scheduler with explicit lifecycle management.
pub struct CleanupScheduler {
    scheduler: Option<JobScheduler>,
    config: CleanupSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    events: Arc<dyn CachedEventRepository>,
}

impl CleanupScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(
        cron_expression: String,
        events: Arc<dyn CachedEventRepository>,
    ) -> SchedulerResult<Self> {
        let config = CleanupSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, events)
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(
        config: CleanupSchedulerConfig,
        events: Arc<dyn CachedEventRepository>,
    ) -> SchedulerResult<Self> {
        Ok(Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            events,
        })
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|source| SchedulerError::StartFailed(source.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("Cleanup scheduler monitor cancelled");
        });

        self.monitor_handle = Some(handle);
        info!("Cleanup scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|source| SchedulerError::StopFailed(source.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|source| SchedulerError::TaskJoinFailed(source.to_string()))?;
        }

        info!("Cleanup scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed(source.to_string()))?;

        let cron_expr = self.config.cron_expression.clone();
        let events = self.events.clone();
        let job_timeout = self.config.job_timeout;

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let events = events.clone();

            Box::pin(async move {
                match tokio::time::timeout(job_timeout, events.cleanup_old_events()).await {
                    Ok(Ok(deleted)) => {
                        debug!(deleted, "event cache cleanup finished");
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "event cache cleanup failed");
                    }
                    Err(_) => {
                        warn!(
                            timeout_secs = job_timeout.as_secs(),
                            "event cache cleanup timed out"
                        );
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        debug!(cron = %self.config.cron_expression, "Registered cleanup job");
        Ok(scheduler)
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("CleanupScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use calsync_core::testing::MockCachedEventRepository;

    use super::*;

    fn fast_config() -> CleanupSchedulerConfig {
        CleanupSchedulerConfig {
            cron_expression: "* * * * * *".into(), // every second
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_successfully() {
        let mut scheduler = CleanupScheduler::with_config(
            fast_config(),
            Arc::new(MockCachedEventRepository::new()),
        )
        .expect("created");

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut scheduler = CleanupScheduler::with_config(
            fast_config(),
            Arc::new(MockCachedEventRepository::new()),
        )
        .expect("created");

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }
}
