//! Request and response bodies of the HTTP interface.

use hookline_core::{
    DeliveryId, DeliveryStatus, DispatchSummary, EventId, EventTypeSet, Page, PageRequest,
    TenantId, Timestamp, ValidationError, Webhook, WebhookDelivery, WebhookId, WebhookSecret,
    WebhookStatus, WebhookUpdate,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /api/events`
#[derive(Debug, Clone, Deserialize)]
pub struct PublishEventRequest {
    /// Producer-assigned id; generated when absent
    #[serde(default)]
    pub id: Option<EventId>,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Body of `POST /api/webhooks`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub secret: String,
    pub event_types: Vec<String>,
    #[serde(default)]
    pub status: Option<WebhookStatus>,
}

impl CreateWebhookRequest {
    pub fn into_webhook(self, tenant_id: TenantId) -> Result<Webhook, ValidationError> {
        let secret = WebhookSecret::new(self.secret)?;
        let event_types = EventTypeSet::new(self.event_types)?;
        let webhook = Webhook::new(tenant_id, self.url, secret, event_types)?;

        Ok(match self.status {
            Some(status) => webhook.with_status(status),
            None => webhook,
        })
    }
}

/// Body of `PUT /api/webhooks/{id}`; omitted fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWebhookRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<WebhookStatus>,
}

impl UpdateWebhookRequest {
    pub fn into_update(self) -> Result<WebhookUpdate, ValidationError> {
        Ok(WebhookUpdate {
            url: self.url,
            secret: self.secret.map(WebhookSecret::new).transpose()?,
            event_types: self.event_types.map(EventTypeSet::new).transpose()?,
            status: self.status,
        })
    }
}

/// `?page=&per_page=` query
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn to_page_request(self) -> Result<PageRequest, ValidationError> {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

/// `?batch_size=` query of the admin scans
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BatchQuery {
    pub batch_size: Option<usize>,
}

// ============================================================================
// Responses
// ============================================================================

/// Webhook as exposed over HTTP; the secret is never included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub url: String,
    pub event_types: Vec<String>,
    pub status: WebhookStatus,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            event_types: webhook.event_types.to_vec(),
            tenant_id: webhook.tenant_id,
            url: webhook.url,
            status: webhook.status,
            success_count: webhook.success_count,
            failure_count: webhook.failure_count,
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
        }
    }
}

/// Delivery record as exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub id: DeliveryId,
    pub webhook_id: WebhookId,
    pub event_id: EventId,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub response_code: u16,
    pub response_body: String,
    pub last_error: Option<String>,
    pub last_attempted_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<WebhookDelivery> for DeliveryResponse {
    fn from(delivery: WebhookDelivery) -> Self {
        Self {
            id: delivery.id,
            webhook_id: delivery.webhook_id,
            event_id: delivery.event_id,
            status: delivery.status,
            attempt_count: delivery.attempt_count,
            response_code: delivery.response_code,
            response_body: delivery.response_body,
            last_error: delivery.last_error,
            last_attempted_at: delivery.last_attempted_at,
            created_at: delivery.created_at,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn from_page<S>(page: Page<S>) -> Self
    where
        T: From<S>,
    {
        let page = page.map(T::from);
        Self {
            items: page.items,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        }
    }
}

/// Outcome of `POST /api/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAcceptedResponse {
    pub event_id: EventId,
    pub matched: usize,
    pub scheduled: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub delivery_ids: Vec<DeliveryId>,
}

impl From<DispatchSummary> for EventAcceptedResponse {
    fn from(summary: DispatchSummary) -> Self {
        Self {
            event_id: summary.event_id,
            matched: summary.matched,
            scheduled: summary.scheduled,
            deferred: summary.deferred,
            skipped: summary.skipped,
            delivery_ids: summary.delivery_ids,
        }
    }
}

/// Outcome of an admin scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_size: usize,
    pub processed: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
    pub worker_pool: Option<WorkerPoolStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerPoolStatus {
    pub active: usize,
    pub queued: usize,
}
