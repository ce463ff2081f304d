//! Periodic vendor health probing
//!
//! Drives [`VendorHealthMonitor::run_health_checks`] on an interval so open
//! breakers are closed again once a vendor recovers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use partsource_core::vendor::VendorHealthMonitor;
use partsource_domain::HealthCheckConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

#[derive(Debug, Clone)]
pub struct HealthCheckSchedulerConfig {
    pub interval: Duration,
    /// Upper bound on one sweep over every suspended vendor
    pub sweep_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for HealthCheckSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            sweep_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&HealthCheckConfig> for HealthCheckSchedulerConfig {
    fn from(config: &HealthCheckConfig) -> Self {
        Self { interval: Duration::from_secs(config.interval_secs), ..Self::default() }
    }
}

pub struct HealthCheckScheduler {
    monitor: Arc<VendorHealthMonitor>,
    config: HealthCheckSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl HealthCheckScheduler {
    pub fn new(monitor: Arc<VendorHealthMonitor>, config: HealthCheckSchedulerConfig) -> Self {
        Self {
            monitor,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the health check loop
    ///
    /// # Errors
    ///
    /// Returns error if the scheduler is already running or the interval is
    /// zero
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.config.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let monitor = Arc::clone(&self.monitor);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::check_loop(monitor, config, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = self.config.interval.as_secs(), "health check scheduler started");
        Ok(())
    }

    /// Cancel the loop and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns error if the scheduler is not running or the task does not
    /// stop within the join timeout
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("health check scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn check_loop(
        monitor: Arc<VendorHealthMonitor>,
        config: HealthCheckSchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("health check loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    let started = Instant::now();
                    let sweep = monitor.run_health_checks();
                    match tokio::time::timeout(config.sweep_timeout, sweep).await {
                        Ok(reports) => debug!(
                            checked = reports.len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "health sweep finished"
                        ),
                        Err(_) => warn!(
                            timeout_secs = config.sweep_timeout.as_secs(),
                            "health sweep timed out"
                        ),
                    }
                }
            }
        }
    }
}
