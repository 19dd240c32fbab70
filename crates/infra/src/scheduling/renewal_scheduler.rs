//! Subscription renewal scheduler.
//!
//! Periodically re-issues provider watch calls for subscriptions that are
//! PENDING or whose channel is nearing expiration. Join handles are tracked,
//! cancellation is explicit, and every asynchronous operation is wrapped in
//! a timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use calsync_infra::scheduling::{RenewalScheduler, RenewalSchedulerConfig, SchedulerResult};
//!
//! # async fn example(renewal: Arc<calsync_core::RenewalService>) -> SchedulerResult<()> {
//! let mut scheduler = RenewalScheduler::with_config(
//!     RenewalSchedulerConfig {
//!         cron_expression: "0 */10 * * * *".into(), // every 10 minutes
//!         ..Default::default()
//!     },
//!     renewal,
//! )?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use calsync_core::RenewalService;
use calsync_domain::constants::DEFAULT_RENEWAL_BATCH_SIZE;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the renewal scheduler.
#[derive(Debug, Clone)]
pub struct RenewalSchedulerConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Maximum subscriptions processed per run.
    pub batch_size: usize,
    /// Timeout applied to a single renewal batch.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for RenewalSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */10 * * * *".into(), // every 10 minutes
            batch_size: DEFAULT_RENEWAL_BATCH_SIZE,
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Subscription renewal scheduler with explicit lifecycle management.
pub struct RenewalScheduler {
    scheduler: Option<JobScheduler>,
    config: RenewalSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    renewal: Arc<RenewalService>,
}

impl RenewalScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(cron_expression: String, renewal: Arc<RenewalService>) -> SchedulerResult<Self> {
        let config = RenewalSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, renewal)
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(
        config: RenewalSchedulerConfig,
        renewal: Arc<RenewalService>,
    ) -> SchedulerResult<Self> {
        Ok(Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            renewal,
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

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?;

        start_result.map_err(|source| SchedulerError::StartFailed(source.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!("Renewal scheduler started");
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
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?;

        stop_result.map_err(|source| SchedulerError::StopFailed(source.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|source| SchedulerError::TaskJoinFailed(source.to_string()))?;
        }

        info!("Renewal scheduler stopped");
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
        let renewal = self.renewal.clone();
        let job_timeout = self.config.job_timeout;
        let batch_size = self.config.batch_size;

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let renewal = renewal.clone();

            Box::pin(async move {
                match tokio::time::timeout(job_timeout, renewal.run_once(batch_size)).await {
                    Ok(Ok(summary)) => {
                        debug!(
                            processed = summary.processed,
                            renewed = summary.renewed,
                            failed = summary.failed,
                            "renewal job finished"
                        );
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "renewal job failed");
                    }
                    Err(_) => {
                        warn!(
                            timeout_secs = job_timeout.as_secs(),
                            "renewal job timed out"
                        );
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered renewal job");
        Ok(scheduler)
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Renewal scheduler monitor cancelled");
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RenewalScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use calsync_core::testing::{
        MockCalendarClientFactory, MockCalendarProviderClient, MockCredentialResolver,
        MockSelectedCalendarRepository, MockSubscriptionRepository,
    };
    use calsync_core::SubscriptionService;

    use super::*;

    fn renewal_service() -> Arc<RenewalService> {
        let subscriptions = Arc::new(MockSubscriptionRepository::new());
        let service = Arc::new(SubscriptionService::new(
            subscriptions.clone(),
            Arc::new(MockSelectedCalendarRepository::new()),
        ));
        Arc::new(RenewalService::new(
            service,
            subscriptions,
            Arc::new(MockCredentialResolver::new()),
            Arc::new(MockCalendarClientFactory::with_client(Arc::new(
                MockCalendarProviderClient::new(),
            ))),
        ))
    }

    fn fast_config() -> RenewalSchedulerConfig {
        RenewalSchedulerConfig {
            cron_expression: "* * * * * *".into(), // every second
            ..Default::default()
        }
    }

    #[test]
    fn default_config_uses_the_ten_minute_schedule() {
        let config = RenewalSchedulerConfig::default();
        assert_eq!(config.cron_expression, "0 */10 * * * *");
        assert_eq!(config.batch_size, DEFAULT_RENEWAL_BATCH_SIZE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_successfully() {
        let mut scheduler =
            RenewalScheduler::with_config(fast_config(), renewal_service()).expect("created");

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let mut scheduler =
            RenewalScheduler::with_config(fast_config(), renewal_service()).expect("created");

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_after_stop_succeeds() {
        let mut scheduler =
            RenewalScheduler::with_config(fast_config(), renewal_service()).expect("created");

        scheduler.start().await.expect("start succeeds");
        scheduler.stop().await.expect("stop succeeds");
        assert!(!scheduler.is_running());

        scheduler.start().await.expect("start again");
        scheduler.stop().await.expect("stop again");
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let mut scheduler =
            RenewalScheduler::with_config(fast_config(), renewal_service()).expect("created");

        let err = scheduler.stop().await.expect_err("stop fails");
        assert!(matches!(err, SchedulerError::NotRunning));
    }
}
