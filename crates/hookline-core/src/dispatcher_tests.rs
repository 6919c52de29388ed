use super::*;
use crate::ledger::DeliveryStatus;
use crate::test_support::{event, tenant, webhook, CapturingScheduler, Harness};
use crate::worker_pool::EnqueueError;
use crate::{HooklineError, PageRequest};

fn dispatcher(harness: &Harness, scheduler: Arc<CapturingScheduler>) -> DeliveryDispatcher {
    DeliveryDispatcher::new(
        EventMatcher::new(harness.registry.clone()),
        harness.ledger.clone(),
        harness.events.clone(),
        scheduler,
    )
}

#[tokio::test]
async fn test_dispatch_records_and_schedules_one_delivery_per_match() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let first = harness
        .registry
        .create(webhook(&owner, &["user.created"]))
        .await
        .unwrap();
    let second = harness
        .registry
        .create(webhook(&owner, &["user.created"]))
        .await
        .unwrap();
    let scheduler = CapturingScheduler::new();

    let evt = event(&owner, "user.created");
    let summary = dispatcher(&harness, scheduler.clone())
        .dispatch(&evt)
        .await
        .unwrap();

    assert_eq!(summary.event_id, evt.id);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.scheduled, 2);
    assert_eq!(summary.deferred, 0);
    assert_eq!(summary.delivery_ids.len(), 2);

    let jobs = scheduler.jobs();
    let mut webhook_ids: Vec<_> = jobs.iter().map(|job| job.webhook.id).collect();
    webhook_ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(webhook_ids, expected);
    assert!(jobs
        .iter()
        .all(|job| job.delivery.status == DeliveryStatus::Pending));

    // Nothing is attempted synchronously
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_dispatch_persists_event() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let evt = event(&owner, "user.created");

    dispatcher(&harness, CapturingScheduler::new())
        .dispatch(&evt)
        .await
        .unwrap();

    let stored = harness.events.get(evt.id, &owner).await.unwrap();
    assert_eq!(stored, Some(evt));
}

#[tokio::test]
async fn test_dispatch_without_subscribers_creates_nothing() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let hook = harness
        .registry
        .create(webhook(&owner, &["order.created"]))
        .await
        .unwrap();

    let summary = dispatcher(&harness, CapturingScheduler::new())
        .dispatch(&event(&owner, "user.created"))
        .await
        .unwrap();

    assert_eq!(summary.matched, 0);
    let deliveries = harness
        .ledger
        .list_for_webhook(hook, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(deliveries.total, 0);
}

#[tokio::test]
async fn test_dispatch_rejects_malformed_event() {
    let harness = Harness::new();
    let malformed = event(&tenant("tenant-a"), "");

    let result = dispatcher(&harness, CapturingScheduler::new())
        .dispatch(&malformed)
        .await;

    assert!(matches!(result, Err(HooklineError::Validation(_))));
    assert!(harness
        .events
        .get(malformed.id, &tenant("tenant-a"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_full_queue_defers_delivery_but_keeps_record() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    harness
        .registry
        .create(webhook(&owner, &["user.created"]))
        .await
        .unwrap();

    let summary = dispatcher(&harness, CapturingScheduler::rejecting(EnqueueError::QueueFull))
        .dispatch(&event(&owner, "user.created"))
        .await
        .unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.scheduled, 0);
    assert_eq!(summary.deferred, 1);

    let pending = harness.ledger.list_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, summary.delivery_ids[0]);
}

#[tokio::test]
async fn test_other_tenants_webhooks_are_never_matched() {
    let harness = Harness::new();
    harness
        .registry
        .create(webhook(&tenant("tenant-b"), &["user.created"]))
        .await
        .unwrap();
    let scheduler = CapturingScheduler::new();

    let summary = dispatcher(&harness, scheduler.clone())
        .dispatch(&event(&tenant("tenant-a"), "user.created"))
        .await
        .unwrap();

    assert_eq!(summary.matched, 0);
    assert!(scheduler.jobs().is_empty());
}

#[tokio::test]
async fn test_repeated_event_id_dispatches_stored_copy() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    harness
        .registry
        .create(webhook(&owner, &["user.created"]))
        .await
        .unwrap();
    let scheduler = CapturingScheduler::new();
    let dispatcher = dispatcher(&harness, scheduler.clone());

    let original = event(&owner, "user.created");
    dispatcher.dispatch(&original).await.unwrap();

    let repeat = Event::new("user.created", owner.clone(), original.payload.clone())
        .with_id(original.id);
    let summary = dispatcher.dispatch(&repeat).await.unwrap();
    assert_eq!(summary.scheduled, 1);

    let jobs = scheduler.jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.event == original));
}

#[tokio::test]
async fn test_repeated_event_id_with_new_payload_is_rejected() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let hook = harness
        .registry
        .create(webhook(&owner, &["user.created"]))
        .await
        .unwrap();
    let scheduler = CapturingScheduler::new();
    let dispatcher = dispatcher(&harness, scheduler.clone());

    let original = Event::new("user.created", owner.clone(), r#"{"v":1}"#);
    dispatcher.dispatch(&original).await.unwrap();

    let changed = Event::new("user.created", owner.clone(), r#"{"v":2}"#).with_id(original.id);
    let result = dispatcher.dispatch(&changed).await;
    assert!(matches!(result, Err(HooklineError::Validation(_))));

    let retyped = Event::new("user.deleted", owner.clone(), r#"{"v":1}"#).with_id(original.id);
    assert!(dispatcher.dispatch(&retyped).await.is_err());

    assert_eq!(scheduler.jobs().len(), 1);
    let stored = harness.events.get(original.id, &owner).await.unwrap();
    assert_eq!(stored, Some(original));

    let page = harness
        .ledger
        .list_for_webhook(hook, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_event_id_of_other_tenant_is_rejected() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let intruder = tenant("tenant-b");
    harness
        .registry
        .create(webhook(&intruder, &["user.created"]))
        .await
        .unwrap();
    let scheduler = CapturingScheduler::new();
    let dispatcher = dispatcher(&harness, scheduler.clone());

    let original = event(&owner, "user.created");
    dispatcher.dispatch(&original).await.unwrap();

    let colliding = Event::new("user.created", intruder.clone(), original.payload.clone())
        .with_id(original.id);
    let result = dispatcher.dispatch(&colliding).await;
    assert!(matches!(result, Err(HooklineError::Validation(_))));
    assert!(scheduler.jobs().is_empty());

    // The owner's event stays retrievable for its retries
    let stored = harness.events.get(original.id, &owner).await.unwrap();
    assert_eq!(stored, Some(original));
    assert_eq!(harness.events.get(colliding.id, &intruder).await.unwrap(), None);
}
