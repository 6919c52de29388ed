use super::*;
use crate::adapters::InMemoryWebhookStore;
use crate::registry::WebhookStore;
use crate::test_support::{event, tenant, webhook};
use crate::webhook::WebhookStatus;
use crate::{Page, PageRequest, StorageError, TenantId, WebhookId};
use async_trait::async_trait;
use std::sync::Arc;

#[tokio::test]
async fn test_matches_only_active_subscribers_of_the_tenant() {
    let store = Arc::new(InMemoryWebhookStore::new());
    let registry = WebhookRegistry::new(store);
    let owner = tenant("tenant-a");

    let first = registry.create(webhook(&owner, &["user.created"])).await.unwrap();
    let second = registry
        .create(webhook(&owner, &["user.created", "user.deleted"]))
        .await
        .unwrap();
    registry
        .create(webhook(&owner, &["user.created"]).with_status(WebhookStatus::Inactive))
        .await
        .unwrap();
    registry
        .create(webhook(&tenant("tenant-b"), &["user.created"]))
        .await
        .unwrap();

    let matched = EventMatcher::new(registry)
        .match_event(&event(&owner, "user.created"))
        .await
        .unwrap();

    let ids: Vec<_> = matched.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
async fn test_no_subscribers_yields_empty_match() {
    let registry = WebhookRegistry::new(Arc::new(InMemoryWebhookStore::new()));

    let matched = EventMatcher::new(registry)
        .match_event(&event(&tenant("tenant-a"), "user.created"))
        .await
        .unwrap();

    assert!(matched.is_empty());
}

/// Store that ignores filters and returns everything
struct LooseStore {
    webhooks: Vec<Webhook>,
}

#[async_trait]
impl WebhookStore for LooseStore {
    async fn insert(&self, _webhook: &Webhook) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, _id: WebhookId) -> Result<Option<Webhook>, StorageError> {
        Ok(None)
    }

    async fn update(&self, _webhook: &Webhook) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn delete(&self, _id: WebhookId) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn list(&self, _tenant_id: &TenantId, page: PageRequest) -> Result<Page<Webhook>, StorageError> {
        Ok(Page::from_ordered(self.webhooks.clone(), page))
    }

    async fn list_by_event_type(
        &self,
        _event_type: &str,
        _tenant_id: &TenantId,
    ) -> Result<Vec<Webhook>, StorageError> {
        Ok(self.webhooks.clone())
    }

    async fn record_outcome(&self, _id: WebhookId, _succeeded: bool) -> Result<bool, StorageError> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_loose_storage_results_are_filtered() {
    let owner = tenant("tenant-a");
    let accepted = webhook(&owner, &["user.created"]);
    let store = LooseStore {
        webhooks: vec![
            accepted.clone(),
            webhook(&owner, &["order.created"]),
            webhook(&tenant("tenant-b"), &["user.created"]),
            webhook(&owner, &["user.created"]).with_status(WebhookStatus::Inactive),
        ],
    };

    let matched = EventMatcher::new(WebhookRegistry::new(Arc::new(store)))
        .match_event(&event(&owner, "user.created"))
        .await
        .unwrap();

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, accepted.id);
}
