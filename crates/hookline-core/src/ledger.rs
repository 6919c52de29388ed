//! Delivery records and their lifecycle.
//!
//! Every (webhook, event) match produces one [`WebhookDelivery`]. The record
//! moves through these states:
//!
//! ```text
//! pending ──claim──▶ in_flight ──2xx──▶ success
//!                        │
//!                        └──other──▶ failed ──claim (attempts < max)──▶ in_flight
//! ```
//!
//! All transitions are conditional on the status and attempt count the caller
//! last observed, so two workers can never both own an attempt and a
//! successful record is never modified again.

use crate::{
    ensure_tenant, event::Event, webhook::Webhook, DeliveryId, EventId, HooklineError,
    HooklineResult, Page, PageRequest, StorageError, TenantId, Timestamp,
    ValidationError, WebhookId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts allowed before a failed delivery is dead
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Error recorded when an in-flight attempt never reported back
pub const INTERRUPTED_ERROR: &str = "delivery attempt interrupted";

/// Error recorded when the event behind a delivery is gone
pub const EVENT_MISSING_ERROR: &str = "original event not found";

/// Error recorded when the webhook behind a delivery is gone
pub const WEBHOOK_MISSING_ERROR: &str = "webhook no longer exists";

/// Error recorded when the webhook behind a delivery was deactivated
pub const WEBHOOK_INACTIVE_ERROR: &str = "webhook is inactive";

const RESOURCE: &str = "delivery";

// ============================================================================
// Status
// ============================================================================

/// Lifecycle state of a delivery record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created, waiting for its first attempt
    Pending,
    /// An attempt has been claimed and is running
    InFlight,
    /// Receiver answered 2xx (terminal)
    Success,
    /// Last attempt failed
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Record
// ============================================================================

/// Record of delivering one event to one webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub webhook_id: WebhookId,
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    /// HTTP status of the last attempt, 0 if no response was received
    pub response_code: u16,
    /// Truncated body of the last response
    pub response_body: String,
    pub last_error: Option<String>,
    pub last_attempted_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl WebhookDelivery {
    /// A fresh pending record for `webhook` receiving `event`
    pub fn pending(webhook: &Webhook, event: &Event) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id: webhook.id,
            event_id: event.id,
            tenant_id: event.tenant_id.clone(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            response_code: 0,
            response_body: String::new(),
            last_error: None,
            last_attempted_at: None,
            created_at: Timestamp::now(),
        }
    }

    /// Failed with no attempts left
    pub fn is_dead(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Failed && self.attempt_count >= max_attempts
    }

    /// Failed with attempts left
    pub fn is_retriable(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Failed && self.attempt_count < max_attempts
    }
}

/// Result of one HTTP attempt, as seen by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Receiver answered 2xx
    Delivered { status_code: u16, body_excerpt: String },
    /// Receiver answered with a non-2xx status
    Rejected { status_code: u16, body_excerpt: String },
    /// No response was received
    TransportFailed { message: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Response status, 0 when no response was received
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Delivered { status_code, .. } | Self::Rejected { status_code, .. } => *status_code,
            Self::TransportFailed { .. } => 0,
        }
    }

    fn apply_to(&self, delivery: &mut WebhookDelivery) {
        match self {
            Self::Delivered {
                status_code,
                body_excerpt,
            } => {
                delivery.status = DeliveryStatus::Success;
                delivery.response_code = *status_code;
                delivery.response_body = body_excerpt.clone();
                delivery.last_error = None;
            }
            Self::Rejected {
                status_code,
                body_excerpt,
            } => {
                delivery.status = DeliveryStatus::Failed;
                delivery.response_code = *status_code;
                delivery.response_body = body_excerpt.clone();
                delivery.last_error = Some(format!("HTTP {}", status_code));
            }
            Self::TransportFailed { message } => {
                delivery.status = DeliveryStatus::Failed;
                delivery.response_code = 0;
                delivery.response_body = String::new();
                delivery.last_error = Some(message.clone());
            }
        }
    }
}

// ============================================================================
// Persistence contract
// ============================================================================

/// Persistence contract for delivery records
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Insert a new record
    async fn insert(&self, delivery: &WebhookDelivery) -> Result<(), StorageError>;

    /// Fetch a record by id (not tenant-scoped)
    async fn get(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>, StorageError>;

    /// Replace a record only if its stored status and attempt count still equal
    /// the expected values
    ///
    /// Returns `false` when the record is missing or has moved on.
    async fn update_if(
        &self,
        delivery: &WebhookDelivery,
        expected_status: DeliveryStatus,
        expected_attempts: u32,
    ) -> Result<bool, StorageError>;

    /// Deliveries of one webhook, newest first
    async fn list_by_webhook(
        &self,
        webhook_id: WebhookId,
        page: PageRequest,
    ) -> Result<Page<WebhookDelivery>, StorageError>;

    /// Pending deliveries, oldest first
    async fn list_pending(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StorageError>;

    /// Failed deliveries with fewer than `max_attempts` attempts, least
    /// recently attempted first
    async fn list_failed(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<WebhookDelivery>, StorageError>;

    /// In-flight deliveries whose attempt started before `cutoff`
    async fn list_in_flight_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StorageError>;
}

// ============================================================================
// Ledger
// ============================================================================

/// Lifecycle rules layered over a [`DeliveryStore`]
#[derive(Clone)]
pub struct DeliveryLedger {
    store: Arc<dyn DeliveryStore>,
    max_attempts: u32,
}

impl DeliveryLedger {
    pub fn new(store: Arc<dyn DeliveryStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a new pending delivery of `event` to `webhook`
    pub async fn create_pending(
        &self,
        webhook: &Webhook,
        event: &Event,
    ) -> HooklineResult<WebhookDelivery> {
        let delivery = WebhookDelivery::pending(webhook, event);
        self.store.insert(&delivery).await?;

        debug!(
            delivery_id = %delivery.id,
            webhook_id = %webhook.id,
            event_id = %event.id,
            "Delivery recorded"
        );
        Ok(delivery)
    }

    /// Fetch a delivery owned by `tenant_id`
    pub async fn get(&self, id: DeliveryId, tenant_id: &TenantId) -> HooklineResult<WebhookDelivery> {
        let delivery = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| HooklineError::not_found(RESOURCE, id))?;

        ensure_tenant(RESOURCE, id, &delivery.tenant_id, tenant_id)?;
        Ok(delivery)
    }

    /// Deliveries of a webhook, newest first
    pub async fn list_for_webhook(
        &self,
        webhook_id: WebhookId,
        page: PageRequest,
    ) -> HooklineResult<Page<WebhookDelivery>> {
        Ok(self.store.list_by_webhook(webhook_id, page).await?)
    }

    pub async fn list_pending(&self, limit: usize) -> HooklineResult<Vec<WebhookDelivery>> {
        Ok(self.store.list_pending(limit).await?)
    }

    /// Failed deliveries that still have attempts left
    pub async fn list_retriable(&self, limit: usize) -> HooklineResult<Vec<WebhookDelivery>> {
        Ok(self.store.list_failed(limit, self.max_attempts).await?)
    }

    pub async fn list_stale(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> HooklineResult<Vec<WebhookDelivery>> {
        Ok(self.store.list_in_flight_before(cutoff, limit).await?)
    }

    /// Take ownership of the next attempt of `observed`
    ///
    /// Succeeds only if the stored record still has the observed status and
    /// attempt count, the status is pending or failed, and attempts remain. On
    /// success the record is in flight with its attempt count incremented.
    /// Returns `None` when another worker got there first.
    pub async fn claim(&self, observed: &WebhookDelivery) -> HooklineResult<Option<WebhookDelivery>> {
        if !matches!(
            observed.status,
            DeliveryStatus::Pending | DeliveryStatus::Failed
        ) {
            return Ok(None);
        }

        if observed.attempt_count >= self.max_attempts {
            return Ok(None);
        }

        let mut claimed = observed.clone();
        claimed.status = DeliveryStatus::InFlight;
        claimed.attempt_count += 1;
        claimed.last_attempted_at = Some(Timestamp::now());

        let won = self
            .store
            .update_if(&claimed, observed.status, observed.attempt_count)
            .await?;

        if !won {
            debug!(delivery_id = %observed.id, "Delivery already claimed elsewhere");
            return Ok(None);
        }

        Ok(Some(claimed))
    }

    /// Store the outcome of the attempt held by `claimed`
    pub async fn record_outcome(
        &self,
        claimed: &WebhookDelivery,
        outcome: &AttemptOutcome,
    ) -> HooklineResult<WebhookDelivery> {
        if claimed.status != DeliveryStatus::InFlight {
            return Err(ValidationError::InvalidState {
                field: "status".to_string(),
                message: format!(
                    "outcome can only be recorded for an in-flight delivery, found {}",
                    claimed.status
                ),
            }
            .into());
        }

        let mut completed = claimed.clone();
        outcome.apply_to(&mut completed);

        let stored = self
            .store
            .update_if(&completed, DeliveryStatus::InFlight, claimed.attempt_count)
            .await?;

        if !stored {
            warn!(
                delivery_id = %claimed.id,
                attempt = claimed.attempt_count,
                "Delivery changed while the attempt was in flight"
            );
            return Err(HooklineError::Internal {
                message: format!(
                    "delivery {} changed while attempt {} was in flight",
                    claimed.id, claimed.attempt_count
                ),
            });
        }

        Ok(completed)
    }

    /// Fail a delivery permanently, leaving no attempts
    pub async fn mark_dead(
        &self,
        observed: &WebhookDelivery,
        reason: &str,
    ) -> HooklineResult<Option<WebhookDelivery>> {
        if observed.status == DeliveryStatus::Success {
            return Ok(None);
        }

        let mut dead = observed.clone();
        dead.status = DeliveryStatus::Failed;
        dead.attempt_count = dead.attempt_count.max(self.max_attempts);
        dead.last_error = Some(reason.to_string());

        let stored = self
            .store
            .update_if(&dead, observed.status, observed.attempt_count)
            .await?;

        if !stored {
            return Ok(None);
        }

        warn!(delivery_id = %dead.id, reason, "Delivery marked dead");
        Ok(Some(dead))
    }

    /// Fail an in-flight delivery whose attempt never reported back
    ///
    /// The attempt counts against the limit, so the delivery becomes
    /// retriable only if attempts remain.
    pub async fn mark_interrupted(
        &self,
        observed: &WebhookDelivery,
    ) -> HooklineResult<Option<WebhookDelivery>> {
        if observed.status != DeliveryStatus::InFlight {
            return Ok(None);
        }

        let mut interrupted = observed.clone();
        interrupted.status = DeliveryStatus::Failed;
        interrupted.response_code = 0;
        interrupted.last_error = Some(INTERRUPTED_ERROR.to_string());

        let stored = self
            .store
            .update_if(&interrupted, DeliveryStatus::InFlight, observed.attempt_count)
            .await?;

        if !stored {
            return Ok(None);
        }

        info!(
            delivery_id = %interrupted.id,
            attempt = interrupted.attempt_count,
            "Interrupted delivery attempt recovered"
        );
        Ok(Some(interrupted))
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
