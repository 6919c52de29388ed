//! Tenant-scoped webhook registry.
//!
//! [`WebhookRegistry`] owns create/read/update/delete of subscriptions and
//! enforces that a tenant only ever sees its own webhooks. Storage is reached
//! through the [`WebhookStore`] trait.

use crate::{
    ensure_tenant,
    webhook::{Webhook, WebhookUpdate},
    HooklineError, HooklineResult, Page, PageRequest, StorageError, TenantId, WebhookId,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const RESOURCE: &str = "webhook";

/// Persistence contract for webhook subscriptions
///
/// Lookups by id are not tenant-scoped so that the registry can tell a missing
/// record apart from one owned by another tenant.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert a new webhook
    async fn insert(&self, webhook: &Webhook) -> Result<(), StorageError>;

    /// Fetch a webhook by id
    async fn get(&self, id: WebhookId) -> Result<Option<Webhook>, StorageError>;

    /// Replace the mutable attributes of an existing webhook
    ///
    /// Writes url, secret, event types, status and `updated_at`. Counters are
    /// never written here. Returns `false` if the webhook does not exist.
    async fn update(&self, webhook: &Webhook) -> Result<bool, StorageError>;

    /// Delete a webhook, returning `false` if it did not exist
    async fn delete(&self, id: WebhookId) -> Result<bool, StorageError>;

    /// List a tenant's webhooks in creation order
    async fn list(&self, tenant_id: &TenantId, page: PageRequest) -> Result<Page<Webhook>, StorageError>;

    /// List a tenant's active webhooks subscribed to `event_type`
    async fn list_by_event_type(
        &self,
        event_type: &str,
        tenant_id: &TenantId,
    ) -> Result<Vec<Webhook>, StorageError>;

    /// Atomically increment the success or failure counter
    ///
    /// Returns `false` if the webhook no longer exists.
    async fn record_outcome(&self, id: WebhookId, succeeded: bool) -> Result<bool, StorageError>;
}

/// Tenant-enforcing front end over a [`WebhookStore`]
#[derive(Clone)]
pub struct WebhookRegistry {
    store: Arc<dyn WebhookStore>,
}

impl WebhookRegistry {
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new webhook
    #[instrument(skip(self, webhook), fields(webhook_id = %webhook.id, tenant_id = %webhook.tenant_id))]
    pub async fn create(&self, webhook: Webhook) -> HooklineResult<WebhookId> {
        webhook.validate()?;

        self.store.insert(&webhook).await?;

        info!(
            url = %webhook.url,
            event_types = webhook.event_types.len(),
            "Webhook registered"
        );
        Ok(webhook.id)
    }

    /// Fetch a webhook owned by `tenant_id`
    pub async fn get(&self, id: WebhookId, tenant_id: &TenantId) -> HooklineResult<Webhook> {
        let webhook = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| HooklineError::not_found(RESOURCE, id))?;

        if let Err(e) = ensure_tenant(RESOURCE, id, &webhook.tenant_id, tenant_id) {
            warn!(
                webhook_id = %id,
                tenant_id = %tenant_id,
                "Cross-tenant webhook access denied"
            );
            return Err(e);
        }

        Ok(webhook)
    }

    /// Replace a webhook's mutable attributes
    ///
    /// Identity, owner, creation time and counters are taken from the stored
    /// record, whatever the caller passes in.
    #[instrument(skip(self, webhook), fields(webhook_id = %webhook.id, tenant_id = %webhook.tenant_id))]
    pub async fn update(&self, webhook: Webhook) -> HooklineResult<Webhook> {
        webhook.validate()?;

        let mut stored = self.get(webhook.id, &webhook.tenant_id).await?;
        stored.apply(WebhookUpdate {
            url: Some(webhook.url),
            secret: Some(webhook.secret),
            event_types: Some(webhook.event_types),
            status: Some(webhook.status),
        })?;

        self.persist(stored).await
    }

    /// Apply a partial update to a webhook owned by `tenant_id`
    #[instrument(skip(self, update), fields(webhook_id = %id, tenant_id = %tenant_id))]
    pub async fn modify(
        &self,
        id: WebhookId,
        tenant_id: &TenantId,
        update: WebhookUpdate,
    ) -> HooklineResult<Webhook> {
        let mut stored = self.get(id, tenant_id).await?;
        stored.apply(update)?;
        self.persist(stored).await
    }

    async fn persist(&self, webhook: Webhook) -> HooklineResult<Webhook> {
        if !self.store.update(&webhook).await? {
            // Deleted between read and write
            return Err(HooklineError::not_found(RESOURCE, webhook.id));
        }

        info!(status = %webhook.status, "Webhook updated");
        Ok(webhook)
    }

    /// Delete a webhook owned by `tenant_id`
    #[instrument(skip(self), fields(webhook_id = %id, tenant_id = %tenant_id))]
    pub async fn delete(&self, id: WebhookId, tenant_id: &TenantId) -> HooklineResult<()> {
        self.get(id, tenant_id).await?;

        if !self.store.delete(id).await? {
            return Err(HooklineError::not_found(RESOURCE, id));
        }

        info!("Webhook deleted");
        Ok(())
    }

    /// List a tenant's webhooks
    pub async fn list(&self, tenant_id: &TenantId, page: PageRequest) -> HooklineResult<Page<Webhook>> {
        Ok(self.store.list(tenant_id, page).await?)
    }

    /// Active webhooks of `tenant_id` subscribed to `event_type`
    pub async fn list_by_event_type(
        &self,
        event_type: &str,
        tenant_id: &TenantId,
    ) -> HooklineResult<Vec<Webhook>> {
        Ok(self.store.list_by_event_type(event_type, tenant_id).await?)
    }

    /// Count one attempt against the webhook's success or failure counter
    pub async fn record_outcome(&self, id: WebhookId, succeeded: bool) -> HooklineResult<()> {
        if !self.store.record_outcome(id, succeeded).await? {
            debug!(webhook_id = %id, "Webhook removed before its outcome was counted");
            return Err(HooklineError::not_found(RESOURCE, id));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
