//! # Retry Scheduler
//!
//! Periodically runs the two delivery scans of the core service:
//! - pending deliveries never attempted (deferred enqueues, crash leftovers)
//! - failed deliveries with attempts left whose backoff has elapsed
//!
//! The first scan runs immediately on start so records left behind by a
//! previous process are picked up without waiting a full interval.

use hookline_api::config::SchedulerConfig;
use hookline_core::WebhookService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

/// Counts from one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub pending_attempted: usize,
    pub failed_retried: usize,
}

/// Drives the pending and failed delivery scans on a fixed interval
pub struct RetryScheduler {
    service: Arc<WebhookService>,
    interval: Duration,
    batch_size: usize,
}

impl RetryScheduler {
    pub fn new(service: Arc<WebhookService>, config: &SchedulerConfig) -> Self {
        Self {
            service,
            interval: config.interval(),
            batch_size: config.batch_size,
        }
    }

    /// Run both scans once
    ///
    /// A failing scan is logged and does not prevent the other from running.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run_once(&self) -> ScanReport {
        let mut report = ScanReport::default();

        match self.service.process_pending_deliveries(self.batch_size).await {
            Ok(count) => report.pending_attempted = count,
            Err(e) => error!(error = %e, "Pending delivery scan failed"),
        }

        match self.service.retry_failed_deliveries(self.batch_size).await {
            Ok(count) => report.failed_retried = count,
            Err(e) => error!(error = %e, "Failed delivery scan failed"),
        }

        debug!(
            pending_attempted = report.pending_attempted,
            failed_retried = report.failed_retried,
            "Scheduler pass complete"
        );
        report
    }

    /// Start the scan loop on the runtime
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));

        SchedulerHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_seconds = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Retry scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = stop.changed() => {
                    // A dropped handle also ends the loop
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retry scheduler stopped");
    }
}

/// Handle to a running [`RetryScheduler`]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop, letting a pass already in progress finish
    pub async fn stop(self) {
        // The receiver is gone only if the task already ended
        let _ = self.stop.send(true);

        if let Err(e) = self.task.await {
            error!(error = %e, "Retry scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
