//! # Webhook Service
//!
//! [`WebhookService`] wires the registry, ledger, dispatcher, worker pool and
//! retry coordinator together and exposes the operations other layers use.
//! Transport and persistence are injected so the same wiring runs in tests,
//! in a single-node deployment, and against external stores.

use crate::{
    adapters::{InMemoryDeliveryStore, InMemoryEventStore, InMemoryWebhookStore},
    dispatcher::{DeliveryDispatcher, DispatchSummary},
    event::{Event, EventStore},
    executor::{DeliveryExecutor, ExecutorConfig, HttpTransport},
    ledger::{DeliveryLedger, DeliveryStore, WebhookDelivery, DEFAULT_MAX_ATTEMPTS},
    matcher::EventMatcher,
    registry::{WebhookRegistry, WebhookStore},
    retry::{RecoveryConfig, RetryCoordinator, RetryPolicy},
    webhook::{Webhook, WebhookUpdate},
    worker_pool::{DeliveryScheduler, DeliveryWorkerPool, WorkerPoolConfig},
    DeliveryId, HooklineResult, Page, PageRequest, TenantId, WebhookId,
};
use std::sync::Arc;

/// The persistence contracts the service depends on
#[derive(Clone)]
pub struct Persistence {
    pub webhooks: Arc<dyn WebhookStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub events: Arc<dyn EventStore>,
}

impl Persistence {
    /// Fresh in-memory stores
    pub fn in_memory() -> Self {
        Self {
            webhooks: Arc::new(InMemoryWebhookStore::new()),
            deliveries: Arc::new(InMemoryDeliveryStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
        }
    }
}

/// Delivery tuning shared by the executor, worker pool and retry coordinator
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub executor: ExecutorConfig,
    pub worker_pool: WorkerPoolConfig,
    pub retry_policy: RetryPolicy,
    pub recovery: RecoveryConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            executor: ExecutorConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            retry_policy: RetryPolicy::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Entry point for webhook management and event delivery
pub struct WebhookService {
    registry: WebhookRegistry,
    ledger: DeliveryLedger,
    dispatcher: DeliveryDispatcher,
    coordinator: RetryCoordinator,
    worker_pool: Option<Arc<DeliveryWorkerPool>>,
}

impl WebhookService {
    /// Wire the service around a freshly started worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        persistence: Persistence,
        transport: Arc<dyn HttpTransport>,
        config: DeliveryConfig,
    ) -> Self {
        let (registry, ledger, executor) = Self::core(&persistence, transport, &config);
        let pool = Arc::new(DeliveryWorkerPool::start(
            executor.clone(),
            config.worker_pool.clone(),
        ));

        let mut service = Self::assemble(
            registry,
            ledger,
            executor,
            persistence.events,
            pool.clone(),
            config,
        );
        service.worker_pool = Some(pool);
        service
    }

    /// Wire the service around a caller-provided scheduler
    pub fn with_scheduler(
        persistence: Persistence,
        transport: Arc<dyn HttpTransport>,
        scheduler: Arc<dyn DeliveryScheduler>,
        config: DeliveryConfig,
    ) -> Self {
        let (registry, ledger, executor) = Self::core(&persistence, transport, &config);
        Self::assemble(registry, ledger, executor, persistence.events, scheduler, config)
    }

    fn core(
        persistence: &Persistence,
        transport: Arc<dyn HttpTransport>,
        config: &DeliveryConfig,
    ) -> (WebhookRegistry, DeliveryLedger, Arc<DeliveryExecutor>) {
        let registry = WebhookRegistry::new(persistence.webhooks.clone());
        let ledger = DeliveryLedger::new(persistence.deliveries.clone(), config.max_attempts);
        let executor = Arc::new(DeliveryExecutor::new(
            transport,
            registry.clone(),
            ledger.clone(),
            config.executor.clone(),
        ));
        (registry, ledger, executor)
    }

    fn assemble(
        registry: WebhookRegistry,
        ledger: DeliveryLedger,
        executor: Arc<DeliveryExecutor>,
        events: Arc<dyn EventStore>,
        scheduler: Arc<dyn DeliveryScheduler>,
        config: DeliveryConfig,
    ) -> Self {
        let dispatcher = DeliveryDispatcher::new(
            EventMatcher::new(registry.clone()),
            ledger.clone(),
            events.clone(),
            scheduler,
        );
        let coordinator = RetryCoordinator::new(
            registry.clone(),
            ledger.clone(),
            events,
            executor,
            config.retry_policy,
            config.recovery,
        );

        Self {
            registry,
            ledger,
            dispatcher,
            coordinator,
            worker_pool: None,
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Dispatch an event to every matching webhook without waiting for delivery
    pub async fn process_event(&self, event: Event) -> HooklineResult<DispatchSummary> {
        self.dispatcher.dispatch(&event).await
    }

    // ------------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------------

    pub async fn create_webhook(&self, webhook: Webhook) -> HooklineResult<WebhookId> {
        self.registry.create(webhook).await
    }

    pub async fn get_webhook(&self, id: WebhookId, tenant_id: &TenantId) -> HooklineResult<Webhook> {
        self.registry.get(id, tenant_id).await
    }

    /// Replace a webhook's url, secret, event types and status
    pub async fn update_webhook(&self, webhook: Webhook) -> HooklineResult<Webhook> {
        self.registry.update(webhook).await
    }

    /// Change only the attributes set in `update`
    pub async fn modify_webhook(
        &self,
        id: WebhookId,
        tenant_id: &TenantId,
        update: WebhookUpdate,
    ) -> HooklineResult<Webhook> {
        self.registry.modify(id, tenant_id, update).await
    }

    pub async fn delete_webhook(&self, id: WebhookId, tenant_id: &TenantId) -> HooklineResult<()> {
        self.registry.delete(id, tenant_id).await
    }

    pub async fn list_webhooks(
        &self,
        tenant_id: &TenantId,
        page: PageRequest,
    ) -> HooklineResult<Page<Webhook>> {
        self.registry.list(tenant_id, page).await
    }

    // ------------------------------------------------------------------------
    // Deliveries
    // ------------------------------------------------------------------------

    pub async fn get_delivery_status(
        &self,
        id: DeliveryId,
        tenant_id: &TenantId,
    ) -> HooklineResult<WebhookDelivery> {
        self.ledger.get(id, tenant_id).await
    }

    /// Deliveries of a webhook owned by `tenant_id`, newest first
    pub async fn list_deliveries(
        &self,
        webhook_id: WebhookId,
        tenant_id: &TenantId,
        page: PageRequest,
    ) -> HooklineResult<Page<WebhookDelivery>> {
        self.registry.get(webhook_id, tenant_id).await?;
        self.ledger.list_for_webhook(webhook_id, page).await
    }

    pub async fn retry_delivery(
        &self,
        id: DeliveryId,
        tenant_id: &TenantId,
    ) -> HooklineResult<WebhookDelivery> {
        self.coordinator.retry_delivery(id, tenant_id).await
    }

    pub async fn process_pending_deliveries(&self, batch_size: usize) -> HooklineResult<usize> {
        self.coordinator.process_pending_deliveries(batch_size).await
    }

    pub async fn retry_failed_deliveries(&self, batch_size: usize) -> HooklineResult<usize> {
        self.coordinator.retry_failed_deliveries(batch_size).await
    }

    pub fn max_attempts(&self) -> u32 {
        self.ledger.max_attempts()
    }

    /// Attempts and queued jobs in the worker pool, if this service owns one
    pub fn worker_pool_load(&self) -> Option<(usize, usize)> {
        self.worker_pool
            .as_ref()
            .map(|pool| (pool.active(), pool.queued()))
    }

    /// Stop the owned worker pool, waiting for queued and running attempts
    ///
    /// Returns `false` if attempts were still running at the timeout.
    pub async fn shutdown(&self) -> bool {
        match &self.worker_pool {
            Some(pool) => pool.shutdown().await,
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
