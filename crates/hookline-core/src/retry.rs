//! # Retry and Recovery
//!
//! [`RetryCoordinator`] owns every attempt after the first:
//!
//! - `process_pending_deliveries` recovers records left behind by a crash or a
//!   full worker queue, and first fails in-flight attempts that never reported
//!   back.
//! - `retry_failed_deliveries` re-attempts failed records that still have
//!   attempts left and whose backoff has elapsed.
//! - `retry_delivery` is the tenant-initiated manual retry of one record.
//!
//! Every re-attempt goes through the same conditional claim as the worker pool,
//! so a record is never attempted twice concurrently.

use crate::{
    event::{Event, EventStore},
    executor::DeliveryExecutor,
    ledger::{
        DeliveryLedger, DeliveryStatus, WebhookDelivery, EVENT_MISSING_ERROR,
        WEBHOOK_INACTIVE_ERROR, WEBHOOK_MISSING_ERROR,
    },
    registry::WebhookRegistry,
    webhook::{Webhook, WebhookStatus},
    DeliveryId, HooklineError, HooklineResult, TenantId, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Retry policy
// ============================================================================

/// Backoff between automatic re-attempts of a failed delivery
///
/// The default policy is immediate: a failed delivery is due on the next scan.
///
/// # Examples
///
/// ```rust
/// use hookline_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(Duration::from_secs(30), Duration::from_secs(3600), 2.0);
/// assert_eq!(policy.calculate_delay(1), Duration::from_secs(30));
/// assert_eq!(policy.calculate_delay(2), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    /// Failed deliveries are due as soon as they are seen
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Exponential backoff: `initial * multiplier^(attempts - 1)`, capped at `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay to wait after `attempts_made` attempts before the next one
    pub fn calculate_delay(&self, attempts_made: u32) -> Duration {
        if self.initial_delay.is_zero() || attempts_made == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempts_made - 1).unwrap_or(i32::MAX);
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay_secs.max(0.0))
    }

    /// Whether `delivery`'s backoff has elapsed at `now`
    pub fn is_due(&self, delivery: &WebhookDelivery, now: Timestamp) -> bool {
        let Some(last_attempted_at) = delivery.last_attempted_at else {
            return true;
        };

        now.duration_since(last_attempted_at) >= self.calculate_delay(delivery.attempt_count)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Recovery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Age after which an in-flight attempt is considered interrupted
    pub stale_after_seconds: u64,

    /// Attempts run concurrently within one scan
    pub batch_concurrency: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after_seconds: 300,
            batch_concurrency: 8,
        }
    }
}

/// Drives re-attempts and crash recovery of deliveries
#[derive(Clone)]
pub struct RetryCoordinator {
    registry: WebhookRegistry,
    ledger: DeliveryLedger,
    events: Arc<dyn EventStore>,
    executor: Arc<DeliveryExecutor>,
    policy: RetryPolicy,
    recovery: RecoveryConfig,
}

impl RetryCoordinator {
    pub fn new(
        registry: WebhookRegistry,
        ledger: DeliveryLedger,
        events: Arc<dyn EventStore>,
        executor: Arc<DeliveryExecutor>,
        policy: RetryPolicy,
        recovery: RecoveryConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            events,
            executor,
            policy,
            recovery,
        }
    }

    /// Attempt up to `batch_size` pending deliveries, oldest first
    ///
    /// Before scanning, in-flight attempts older than the stale threshold are
    /// failed as interrupted. Returns the number of attempts made.
    #[instrument(skip(self))]
    pub async fn process_pending_deliveries(&self, batch_size: usize) -> HooklineResult<usize> {
        let recovered = self.recover_interrupted(batch_size).await?;
        let pending = self.ledger.list_pending(batch_size).await?;
        let found = pending.len();
        let processed = self.run_batch(pending).await;

        info!(found, processed, recovered, "Pending deliveries processed");
        Ok(processed)
    }

    /// Re-attempt up to `batch_size` failed deliveries that still have attempts
    /// left and whose backoff has elapsed
    ///
    /// Returns the number of attempts made.
    #[instrument(skip(self))]
    pub async fn retry_failed_deliveries(&self, batch_size: usize) -> HooklineResult<usize> {
        let now = Timestamp::now();
        let candidates = self.ledger.list_retriable(batch_size).await?;
        let found = candidates.len();

        let due: Vec<WebhookDelivery> = candidates
            .into_iter()
            .filter(|delivery| self.policy.is_due(delivery, now))
            .collect();
        let due_count = due.len();
        let processed = self.run_batch(due).await;

        info!(found, due = due_count, processed, "Failed deliveries retried");
        Ok(processed)
    }

    /// Manually re-attempt one failed delivery owned by `tenant_id`
    ///
    /// Backoff is ignored. Checks run in this order: the delivery exists, the
    /// caller owns it, it is failed, it has attempts left, its webhook still
    /// exists and is active, its event still exists. A missing or inactive
    /// webhook and a missing event mark the delivery dead. The attempt then
    /// runs to completion and its error, if any, is returned to the caller.
    #[instrument(skip(self), fields(delivery_id = %delivery_id, tenant_id = %tenant_id))]
    pub async fn retry_delivery(
        &self,
        delivery_id: DeliveryId,
        tenant_id: &TenantId,
    ) -> HooklineResult<WebhookDelivery> {
        let delivery = self.ledger.get(delivery_id, tenant_id).await?;

        if delivery.status != DeliveryStatus::Failed {
            return Err(ValidationError::InvalidState {
                field: "status".to_string(),
                message: format!(
                    "only failed deliveries can be retried, delivery is {}",
                    delivery.status
                ),
            }
            .into());
        }

        if delivery.attempt_count >= self.ledger.max_attempts() {
            return Err(ValidationError::InvalidState {
                field: "attempt_count".to_string(),
                message: format!(
                    "delivery has used all {} attempts",
                    self.ledger.max_attempts()
                ),
            }
            .into());
        }

        let webhook = match self.registry.get(delivery.webhook_id, tenant_id).await {
            Ok(webhook) => webhook,
            Err(e @ HooklineError::NotFound { .. }) => {
                self.ledger.mark_dead(&delivery, WEBHOOK_MISSING_ERROR).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if webhook.status != WebhookStatus::Active {
            self.ledger.mark_dead(&delivery, WEBHOOK_INACTIVE_ERROR).await?;
            return Err(ValidationError::InvalidState {
                field: "webhook".to_string(),
                message: WEBHOOK_INACTIVE_ERROR.to_string(),
            }
            .into());
        }

        let Some(event) = self.events.get(delivery.event_id, tenant_id).await? else {
            self.ledger.mark_dead(&delivery, EVENT_MISSING_ERROR).await?;
            return Err(HooklineError::not_found("event", delivery.event_id));
        };

        let Some(claimed) = self.ledger.claim(&delivery).await? else {
            return Err(ValidationError::InvalidState {
                field: "status".to_string(),
                message: "delivery is already being retried".to_string(),
            }
            .into());
        };

        info!(attempt = claimed.attempt_count, "Manual retry started");
        self.executor.deliver(&webhook, &event, &claimed).await
    }

    async fn recover_interrupted(&self, limit: usize) -> HooklineResult<usize> {
        let stale_after = Duration::from_secs(self.recovery.stale_after_seconds);
        let cutoff = Timestamp::now().subtract_duration(stale_after);

        let mut recovered = 0;
        for delivery in self.ledger.list_stale(cutoff, limit).await? {
            match self.ledger.mark_interrupted(&delivery).await {
                Ok(Some(_)) => recovered += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(delivery_id = %delivery.id, error = %e, "Failed to recover interrupted delivery");
                }
            }
        }
        Ok(recovered)
    }

    async fn run_batch(&self, deliveries: Vec<WebhookDelivery>) -> usize {
        let limit = self.recovery.batch_concurrency.max(1);
        let mut tasks = JoinSet::new();
        let mut processed = 0;

        for delivery in deliveries {
            while tasks.len() >= limit {
                processed += attempted(tasks.join_next().await);
            }

            let coordinator = self.clone();
            tasks.spawn(async move { coordinator.attempt(delivery).await });
        }

        while let Some(result) = tasks.join_next().await {
            processed += attempted(Some(result));
        }

        processed
    }

    /// Claim and run one attempt; `true` if an attempt was made
    async fn attempt(&self, delivery: WebhookDelivery) -> bool {
        let (webhook, event) = match self.resolve(&delivery).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return false,
            Err(e) => {
                warn!(delivery_id = %delivery.id, error = %e, "Skipping delivery");
                return false;
            }
        };

        let claimed = match self.ledger.claim(&delivery).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return false,
            Err(e) => {
                error!(delivery_id = %delivery.id, error = %e, "Failed to claim delivery");
                return false;
            }
        };

        match self.executor.deliver(&webhook, &event, &claimed).await {
            Ok(_) => {}
            Err(e) if e.is_delivery_outcome() => {}
            Err(e) => {
                error!(delivery_id = %claimed.id, error = %e, "Delivery attempt failed");
            }
        }
        true
    }

    /// Look up the webhook and event behind `delivery`
    ///
    /// Marks the delivery dead and returns `None` when either is gone or the
    /// webhook is inactive.
    async fn resolve(&self, delivery: &WebhookDelivery) -> HooklineResult<Option<(Webhook, Event)>> {
        let webhook = match self
            .registry
            .get(delivery.webhook_id, &delivery.tenant_id)
            .await
        {
            Ok(webhook) => webhook,
            Err(HooklineError::NotFound { .. }) => {
                self.ledger.mark_dead(delivery, WEBHOOK_MISSING_ERROR).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if webhook.status != WebhookStatus::Active {
            self.ledger.mark_dead(delivery, WEBHOOK_INACTIVE_ERROR).await?;
            return Ok(None);
        }

        let Some(event) = self
            .events
            .get(delivery.event_id, &delivery.tenant_id)
            .await?
        else {
            self.ledger.mark_dead(delivery, EVENT_MISSING_ERROR).await?;
            return Ok(None);
        };

        debug!(delivery_id = %delivery.id, "Delivery resolved for re-attempt");
        Ok(Some((webhook, event)))
    }
}

fn attempted(result: Option<Result<bool, JoinError>>) -> usize {
    match result {
        Some(Ok(true)) => 1,
        Some(Ok(false)) | None => 0,
        Some(Err(e)) => {
            error!(error = %e, "Delivery task failed");
            0
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
