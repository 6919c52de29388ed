//! # In-Memory Stores
//!
//! Thread-safe in-memory implementations of [`WebhookStore`], [`DeliveryStore`]
//! and [`EventStore`] for testing and single-node deployments.
//!
//! Every operation runs under one lock acquisition, which makes the
//! conditional update and counter increment atomic.

use crate::{
    event::{Event, EventStore},
    ledger::{DeliveryStatus, DeliveryStore, WebhookDelivery},
    registry::WebhookStore,
    webhook::Webhook,
    DeliveryId, EventId, Page, PageRequest, StorageError, TenantId, Timestamp, WebhookId,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::Unavailable {
        message: "store lock poisoned".to_string(),
    })
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::Unavailable {
        message: "store lock poisoned".to_string(),
    })
}

// ============================================================================
// Webhooks
// ============================================================================

/// In-memory webhook subscriptions
#[derive(Clone, Default)]
pub struct InMemoryWebhookStore {
    webhooks: Arc<RwLock<HashMap<WebhookId, Webhook>>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored webhooks across all tenants
    pub fn len(&self) -> usize {
        self.webhooks.read().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn creation_order(a: &Webhook, b: &Webhook) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn insert(&self, webhook: &Webhook) -> Result<(), StorageError> {
        let mut webhooks = write(&self.webhooks)?;
        if webhooks.contains_key(&webhook.id) {
            return Err(StorageError::AlreadyExists {
                resource: "webhook",
                id: webhook.id.to_string(),
            });
        }
        webhooks.insert(webhook.id, webhook.clone());
        Ok(())
    }

    async fn get(&self, id: WebhookId) -> Result<Option<Webhook>, StorageError> {
        Ok(read(&self.webhooks)?.get(&id).cloned())
    }

    async fn update(&self, webhook: &Webhook) -> Result<bool, StorageError> {
        let mut webhooks = write(&self.webhooks)?;
        let Some(stored) = webhooks.get_mut(&webhook.id) else {
            return Ok(false);
        };

        stored.url = webhook.url.clone();
        stored.secret = webhook.secret.clone();
        stored.event_types = webhook.event_types.clone();
        stored.status = webhook.status;
        stored.updated_at = webhook.updated_at;
        Ok(true)
    }

    async fn delete(&self, id: WebhookId) -> Result<bool, StorageError> {
        Ok(write(&self.webhooks)?.remove(&id).is_some())
    }

    async fn list(&self, tenant_id: &TenantId, page: PageRequest) -> Result<Page<Webhook>, StorageError> {
        let mut owned: Vec<Webhook> = read(&self.webhooks)?
            .values()
            .filter(|w| &w.tenant_id == tenant_id)
            .cloned()
            .collect();
        owned.sort_by(creation_order);
        Ok(Page::from_ordered(owned, page))
    }

    async fn list_by_event_type(
        &self,
        event_type: &str,
        tenant_id: &TenantId,
    ) -> Result<Vec<Webhook>, StorageError> {
        let mut matched: Vec<Webhook> = read(&self.webhooks)?
            .values()
            .filter(|w| {
                &w.tenant_id == tenant_id && w.is_active() && w.event_types.contains(event_type)
            })
            .cloned()
            .collect();
        matched.sort_by(creation_order);
        Ok(matched)
    }

    async fn record_outcome(&self, id: WebhookId, succeeded: bool) -> Result<bool, StorageError> {
        let mut webhooks = write(&self.webhooks)?;
        let Some(stored) = webhooks.get_mut(&id) else {
            return Ok(false);
        };

        if succeeded {
            stored.success_count += 1;
        } else {
            stored.failure_count += 1;
        }
        Ok(true)
    }
}

// ============================================================================
// Deliveries
// ============================================================================

/// In-memory delivery records
#[derive(Clone, Default)]
pub struct InMemoryDeliveryStore {
    deliveries: Arc<RwLock<HashMap<DeliveryId, WebhookDelivery>>>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record
    pub fn all(&self) -> Vec<WebhookDelivery> {
        self.deliveries
            .read()
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn last_attempt_order(a: &WebhookDelivery, b: &WebhookDelivery) -> std::cmp::Ordering {
    a.last_attempted_at
        .cmp(&b.last_attempted_at)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn insert(&self, delivery: &WebhookDelivery) -> Result<(), StorageError> {
        let mut deliveries = write(&self.deliveries)?;
        if deliveries.contains_key(&delivery.id) {
            return Err(StorageError::AlreadyExists {
                resource: "delivery",
                id: delivery.id.to_string(),
            });
        }
        deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn get(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>, StorageError> {
        Ok(read(&self.deliveries)?.get(&id).cloned())
    }

    async fn update_if(
        &self,
        delivery: &WebhookDelivery,
        expected_status: DeliveryStatus,
        expected_attempts: u32,
    ) -> Result<bool, StorageError> {
        let mut deliveries = write(&self.deliveries)?;
        let Some(stored) = deliveries.get_mut(&delivery.id) else {
            return Ok(false);
        };

        if stored.status != expected_status || stored.attempt_count != expected_attempts {
            return Ok(false);
        }

        *stored = delivery.clone();
        Ok(true)
    }

    async fn list_by_webhook(
        &self,
        webhook_id: WebhookId,
        page: PageRequest,
    ) -> Result<Page<WebhookDelivery>, StorageError> {
        let mut matched: Vec<WebhookDelivery> = read(&self.deliveries)?
            .values()
            .filter(|d| d.webhook_id == webhook_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_ordered(matched, page))
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StorageError> {
        let mut pending: Vec<WebhookDelivery> = read(&self.deliveries)?
            .values()
            .filter(|d| d.status == DeliveryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_failed(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<WebhookDelivery>, StorageError> {
        let mut failed: Vec<WebhookDelivery> = read(&self.deliveries)?
            .values()
            .filter(|d| d.is_retriable(max_attempts))
            .cloned()
            .collect();
        failed.sort_by(last_attempt_order);
        failed.truncate(limit);
        Ok(failed)
    }

    async fn list_in_flight_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StorageError> {
        let mut stale: Vec<WebhookDelivery> = read(&self.deliveries)?
            .values()
            .filter(|d| {
                d.status == DeliveryStatus::InFlight
                    && d.last_attempted_at.map_or(true, |at| at < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by(last_attempt_order);
        stale.truncate(limit);
        Ok(stale)
    }
}

// ============================================================================
// Events
// ============================================================================

/// In-memory event records
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<HashMap<EventId, Event>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an event, as a retention job would
    pub fn remove(&self, id: EventId) -> bool {
        self.events
            .write()
            .map(|mut events| events.remove(&id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_if_absent(&self, event: &Event) -> Result<bool, StorageError> {
        let mut events = write(&self.events)?;
        if events.contains_key(&event.id) {
            return Ok(false);
        }
        events.insert(event.id, event.clone());
        Ok(true)
    }

    async fn get(&self, id: EventId, tenant_id: &TenantId) -> Result<Option<Event>, StorageError> {
        Ok(read(&self.events)?
            .get(&id)
            .filter(|event| &event.tenant_id == tenant_id)
            .cloned())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
