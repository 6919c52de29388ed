//! Common test utilities for hookline integration tests
//!
//! This module provides:
//! - Service construction around the real `reqwest` transport
//! - A scheduler that parks deliveries so scans can be driven by hand
//! - Fixture builders for webhooks and events

#![allow(dead_code)]

use async_trait::async_trait;
use hookline_core::{
    DeliveryConfig, DeliveryId, DeliveryJob, DeliveryScheduler, DeliveryStatus, EnqueueError,
    Event, EventTypeSet, Persistence, ReqwestTransport, TenantId, TransportConfig, Webhook,
    WebhookDelivery, WebhookId, WebhookSecret, WebhookService,
};
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "integration-secret";

// ============================================================================
// Schedulers
// ============================================================================

/// Accepts every job and runs none, leaving delivery records pending
pub struct ParkingScheduler;

#[async_trait]
impl DeliveryScheduler for ParkingScheduler {
    async fn schedule(&self, _job: DeliveryJob) -> Result<(), EnqueueError> {
        Ok(())
    }
}

/// Rejects every job as if the queue were full
pub struct FullQueueScheduler;

#[async_trait]
impl DeliveryScheduler for FullQueueScheduler {
    async fn schedule(&self, _job: DeliveryJob) -> Result<(), EnqueueError> {
        Err(EnqueueError::QueueFull)
    }
}

// ============================================================================
// Service construction
// ============================================================================

pub fn transport(timeout: Option<Duration>) -> Arc<ReqwestTransport> {
    let config = TransportConfig::default();
    let transport = match timeout {
        Some(timeout) => ReqwestTransport::with_timeout(&config, timeout),
        None => ReqwestTransport::new(&config),
    };
    Arc::new(transport.unwrap())
}

/// Service whose deliveries only happen when a scan is run
pub fn manual_service() -> WebhookService {
    manual_service_with(Persistence::in_memory(), None)
}

pub fn manual_service_with(persistence: Persistence, timeout: Option<Duration>) -> WebhookService {
    WebhookService::with_scheduler(
        persistence,
        transport(timeout),
        Arc::new(ParkingScheduler),
        DeliveryConfig::default(),
    )
}

/// Service delivering through its own worker pool
pub fn pooled_service(config: DeliveryConfig) -> WebhookService {
    WebhookService::start(Persistence::in_memory(), transport(None), config)
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

pub fn webhook(owner: &TenantId, url: &str, event_types: &[&str]) -> Webhook {
    Webhook::new(
        owner.clone(),
        url,
        WebhookSecret::new(SECRET).unwrap(),
        EventTypeSet::new(event_types.iter().copied()).unwrap(),
    )
    .unwrap()
}

pub fn event(owner: &TenantId, event_type: &str, payload: &str) -> Event {
    Event::new(event_type, owner.clone(), payload.to_string())
}

pub async fn register(
    service: &WebhookService,
    owner: &TenantId,
    url: &str,
    event_types: &[&str],
) -> WebhookId {
    service
        .create_webhook(webhook(owner, url, event_types))
        .await
        .unwrap()
}

/// Poll until the delivery reaches `status`, panicking after about two seconds
pub async fn wait_for_status(
    service: &WebhookService,
    id: DeliveryId,
    owner: &TenantId,
    status: DeliveryStatus,
) -> WebhookDelivery {
    for _ in 0..100 {
        let delivery = service.get_delivery_status(id, owner).await.unwrap();
        if delivery.status == status {
            return delivery;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("delivery {} never reached {}", id, status);
}
