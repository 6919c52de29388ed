//! Fixtures shared by the unit tests of this crate.

use crate::{
    adapters::{InMemoryDeliveryStore, InMemoryEventStore, InMemoryWebhookStore},
    event::Event,
    executor::{
        DeliveryExecutor, ExecutorConfig, HttpTransport, OutboundRequest, TransportError,
        TransportResponse,
    },
    ledger::DeliveryLedger,
    registry::WebhookRegistry,
    webhook::{EventTypeSet, Webhook, WebhookSecret},
    worker_pool::{DeliveryJob, DeliveryScheduler, EnqueueError},
    TenantId, DEFAULT_MAX_ATTEMPTS,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn tenant(name: &str) -> TenantId {
    TenantId::new(name).unwrap()
}

pub fn webhook(tenant_id: &TenantId, event_types: &[&str]) -> Webhook {
    Webhook::new(
        tenant_id.clone(),
        "https://receiver.example.com/hooks",
        WebhookSecret::new("test-secret").unwrap(),
        EventTypeSet::new(event_types.iter().copied()).unwrap(),
    )
    .unwrap()
}

pub fn event(tenant_id: &TenantId, event_type: &str) -> Event {
    Event::new(event_type, tenant_id.clone(), r#"{"hello":"world"}"#)
}

/// Transport that records requests and replays scripted responses
///
/// Once the script is exhausted every request gets a `200 ok`.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_with(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Ok(TransportResponse {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }));
    }

    pub fn fail_with(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post(
        &self,
        request: OutboundRequest,
        max_body_bytes: usize,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut response)) => {
                response.body.truncate(max_body_bytes);
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => Ok(TransportResponse {
                status: 200,
                body: Bytes::from_static(b"ok"),
            }),
        }
    }
}

/// Scheduler that keeps jobs instead of running them
#[derive(Default)]
pub struct CapturingScheduler {
    jobs: Mutex<Vec<DeliveryJob>>,
    reject_with: Mutex<Option<EnqueueError>>,
}

impl CapturingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting(error: EnqueueError) -> Arc<Self> {
        let scheduler = Self::default();
        *scheduler.reject_with.lock().unwrap() = Some(error);
        Arc::new(scheduler)
    }

    pub fn jobs(&self) -> Vec<DeliveryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryScheduler for CapturingScheduler {
    async fn schedule(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        if let Some(error) = *self.reject_with.lock().unwrap() {
            return Err(error);
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// In-memory wiring of registry, ledger and executor
pub struct Harness {
    pub webhooks: Arc<InMemoryWebhookStore>,
    pub deliveries: Arc<InMemoryDeliveryStore>,
    pub events: Arc<InMemoryEventStore>,
    pub registry: WebhookRegistry,
    pub ledger: DeliveryLedger,
    pub transport: Arc<RecordingTransport>,
    pub executor: Arc<DeliveryExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        let webhooks = Arc::new(InMemoryWebhookStore::new());
        let deliveries = Arc::new(InMemoryDeliveryStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let registry = WebhookRegistry::new(webhooks.clone());
        let ledger = DeliveryLedger::new(deliveries.clone(), DEFAULT_MAX_ATTEMPTS);
        let transport = RecordingTransport::new();
        let executor = Arc::new(DeliveryExecutor::new(
            transport.clone(),
            registry.clone(),
            ledger.clone(),
            ExecutorConfig::default(),
        ));

        Self {
            webhooks,
            deliveries,
            events,
            registry,
            ledger,
            transport,
            executor,
        }
    }
}
