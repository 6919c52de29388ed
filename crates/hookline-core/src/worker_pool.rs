//! Bounded hand-off between dispatch and execution.
//!
//! Dispatch must return quickly and must never be tied to the lifetime of the
//! request that produced the event. [`DeliveryWorkerPool`] accepts jobs over a
//! bounded channel and runs each one in its own task, owning all of its data,
//! with at most `max_concurrent_deliveries` attempts in flight.
//!
//! A job that cannot be queued within `enqueue_timeout_millis` is rejected. Its
//! delivery record stays pending and the recovery scan in
//! [`crate::retry::RetryCoordinator`] picks it up later.

use crate::{
    event::Event, executor::DeliveryExecutor, ledger::WebhookDelivery, webhook::Webhook,
    HooklineError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{
    mpsc::{self, error::SendTimeoutError},
    Semaphore,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Upper bound on concurrently running attempts
    pub max_concurrent_deliveries: usize,

    /// Jobs that may wait for a free worker
    pub queue_capacity: usize,

    /// How long `schedule` waits for queue space
    pub enqueue_timeout_millis: u64,

    /// How long shutdown waits for queued and running jobs
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deliveries: 32,
            queue_capacity: 1024,
            enqueue_timeout_millis: 250,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl WorkerPoolConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Everything one first attempt needs, owned
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub webhook: Webhook,
    pub event: Event,
    pub delivery: WebhookDelivery,
}

/// Reasons a job was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("delivery queue is full")]
    QueueFull,

    #[error("delivery queue is closed")]
    Closed,
}

/// Accepts first-attempt jobs produced by dispatch
#[async_trait]
pub trait DeliveryScheduler: Send + Sync {
    /// Queue a job without waiting for it to run
    async fn schedule(&self, job: DeliveryJob) -> Result<(), EnqueueError>;
}

/// Bounded pool of delivery tasks
pub struct DeliveryWorkerPool {
    sender: RwLock<Option<mpsc::Sender<DeliveryJob>>>,
    permits: Arc<Semaphore>,
    pump: Mutex<Option<JoinHandle<()>>>,
    config: WorkerPoolConfig,
}

impl DeliveryWorkerPool {
    /// Start the pool on the current tokio runtime
    pub fn start(executor: Arc<DeliveryExecutor>, config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1)));

        let pump = tokio::spawn(pump_jobs(receiver, executor, permits.clone()));

        info!(
            max_concurrent_deliveries = config.max_concurrent_deliveries,
            queue_capacity = config.queue_capacity,
            "Delivery worker pool started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            permits,
            pump: Mutex::new(Some(pump)),
            config,
        }
    }

    /// Attempts currently running
    pub fn active(&self) -> usize {
        self.config
            .max_concurrent_deliveries
            .max(1)
            .saturating_sub(self.permits.available_permits())
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.current_sender()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    fn current_sender(&self) -> Option<mpsc::Sender<DeliveryJob>> {
        self.sender.read().ok().and_then(|guard| guard.clone())
    }

    /// Stop accepting jobs and wait for queued and running ones to finish
    ///
    /// Returns `false` if work was still running when the shutdown timeout
    /// expired. Unfinished records are recovered by the next scan.
    pub async fn shutdown(&self) -> bool {
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }

        let pump = self.pump.lock().ok().and_then(|mut pump| pump.take());
        let Some(pump) = pump else {
            return true;
        };

        let permits = self.permits.clone();
        let total = u32::try_from(self.config.max_concurrent_deliveries.max(1)).unwrap_or(u32::MAX);

        let drained = tokio::time::timeout(self.config.shutdown_timeout(), async move {
            if let Err(e) = pump.await {
                error!(error = %e, "Delivery pump task failed");
            }
            // All permits back means every spawned attempt has finished
            let _all = permits.acquire_many_owned(total).await;
        })
        .await
        .is_ok();

        if drained {
            info!("Delivery worker pool stopped");
        } else {
            warn!(
                active = self.active(),
                "Delivery worker pool shutdown timed out; unfinished deliveries will be recovered"
            );
        }
        drained
    }
}

#[async_trait]
impl DeliveryScheduler for DeliveryWorkerPool {
    async fn schedule(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        let sender = self.current_sender().ok_or(EnqueueError::Closed)?;

        sender
            .send_timeout(job, self.config.enqueue_timeout())
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => EnqueueError::QueueFull,
                SendTimeoutError::Closed(_) => EnqueueError::Closed,
            })
    }
}

async fn pump_jobs(
    mut receiver: mpsc::Receiver<DeliveryJob>,
    executor: Arc<DeliveryExecutor>,
    permits: Arc<Semaphore>,
) {
    while let Some(job) = receiver.recv().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let executor = executor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            run_job(&executor, job).await;
        });
    }

    debug!("Delivery pump drained");
}

async fn run_job(executor: &DeliveryExecutor, job: DeliveryJob) {
    let DeliveryJob {
        webhook,
        event,
        delivery,
    } = job;

    let claimed = match executor.claim(&delivery).await {
        Ok(Some(claimed)) => claimed,
        Ok(None) => {
            debug!(delivery_id = %delivery.id, "Delivery already taken by another worker");
            return;
        }
        Err(e) => {
            error!(delivery_id = %delivery.id, error = %e, "Failed to claim delivery");
            return;
        }
    };

    match executor.deliver(&webhook, &event, &claimed).await {
        Ok(_) => {}
        // Attempt outcomes are logged and recorded by the executor
        Err(e) if e.is_delivery_outcome() => {}
        Err(HooklineError::Internal { message }) => {
            error!(delivery_id = %claimed.id, error = %message, "Delivery outcome not persisted");
        }
        Err(e) => {
            error!(delivery_id = %claimed.id, error = %e, "Delivery attempt failed");
        }
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
