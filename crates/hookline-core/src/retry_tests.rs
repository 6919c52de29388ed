use super::*;
use crate::executor::TransportError;
use crate::ledger::AttemptOutcome;
use crate::test_support::{event, tenant, webhook, Harness};
use crate::webhook::WebhookUpdate;
use crate::DEFAULT_MAX_ATTEMPTS;

fn coordinator(harness: &Harness, policy: RetryPolicy) -> RetryCoordinator {
    RetryCoordinator::new(
        harness.registry.clone(),
        harness.ledger.clone(),
        harness.events.clone(),
        harness.executor.clone(),
        policy,
        RecoveryConfig::default(),
    )
}

/// A registered webhook, a stored event and a pending delivery for it
async fn seeded(harness: &Harness, owner: &TenantId) -> (Webhook, Event, WebhookDelivery) {
    let hook = webhook(owner, &["user.created"]);
    harness.registry.create(hook.clone()).await.unwrap();
    let evt = event(owner, "user.created");
    harness.events.insert_if_absent(&evt).await.unwrap();
    let delivery = harness.ledger.create_pending(&hook, &evt).await.unwrap();
    (hook, evt, delivery)
}

async fn fail_once(harness: &Harness, delivery: &WebhookDelivery) -> WebhookDelivery {
    let claimed = harness.ledger.claim(delivery).await.unwrap().unwrap();
    harness
        .ledger
        .record_outcome(
            &claimed,
            &AttemptOutcome::Rejected {
                status_code: 500,
                body_excerpt: String::new(),
            },
        )
        .await
        .unwrap()
}

// ----------------------------------------------------------------------------
// Policy
// ----------------------------------------------------------------------------

#[test]
fn test_immediate_policy_is_always_due() {
    let policy = RetryPolicy::default();
    let mut delivery = WebhookDelivery {
        attempt_count: 3,
        last_attempted_at: Some(Timestamp::now()),
        ..sample_delivery()
    };

    assert!(policy.is_due(&delivery, Timestamp::now()));

    delivery.last_attempted_at = None;
    assert!(policy.is_due(&delivery, Timestamp::now()));
}

#[test]
fn test_exponential_delay_grows_and_caps() {
    let policy = RetryPolicy::exponential(Duration::from_secs(30), Duration::from_secs(100), 2.0);

    assert_eq!(policy.calculate_delay(0), Duration::ZERO);
    assert_eq!(policy.calculate_delay(1), Duration::from_secs(30));
    assert_eq!(policy.calculate_delay(2), Duration::from_secs(60));
    assert_eq!(policy.calculate_delay(3), Duration::from_secs(100));
    assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_secs(100));
}

#[test]
fn test_exponential_policy_waits_for_backoff() {
    let policy = RetryPolicy::exponential(Duration::from_secs(30), Duration::from_secs(3600), 2.0);
    let attempted_at = Timestamp::from_rfc3339("2024-01-01T00:00:00Z").unwrap();
    let delivery = WebhookDelivery {
        attempt_count: 2,
        last_attempted_at: Some(attempted_at),
        ..sample_delivery()
    };

    let too_soon = Timestamp::from_rfc3339("2024-01-01T00:00:59Z").unwrap();
    let due = Timestamp::from_rfc3339("2024-01-01T00:01:00Z").unwrap();

    assert!(!policy.is_due(&delivery, too_soon));
    assert!(policy.is_due(&delivery, due));
}

fn sample_delivery() -> WebhookDelivery {
    let owner = tenant("tenant-a");
    WebhookDelivery::pending(&webhook(&owner, &["user.created"]), &event(&owner, "user.created"))
}

// ----------------------------------------------------------------------------
// Pending recovery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_process_pending_attempts_oldest_first_within_batch() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, first) = seeded(&harness, &owner).await;
    let (_, _, second) = seeded(&harness, &owner).await;
    let (_, _, third) = seeded(&harness, &owner).await;

    let processed = coordinator(&harness, RetryPolicy::default())
        .process_pending_deliveries(2)
        .await
        .unwrap();

    assert_eq!(processed, 2);
    for id in [first.id, second.id] {
        let stored = harness.ledger.get(id, &owner).await.unwrap();
        assert_eq!(stored.status, DeliveryStatus::Success);
    }
    let untouched = harness.ledger.get(third.id, &owner).await.unwrap();
    assert_eq!(untouched.status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn test_process_pending_marks_missing_event_dead() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, evt, delivery) = seeded(&harness, &owner).await;
    harness.events.remove(evt.id);

    let processed = coordinator(&harness, RetryPolicy::default())
        .process_pending_deliveries(10)
        .await
        .unwrap();

    assert_eq!(processed, 0);
    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert!(stored.is_dead(harness.ledger.max_attempts()));
    assert_eq!(stored.last_error.as_deref(), Some(EVENT_MISSING_ERROR));
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_process_pending_marks_deleted_webhook_dead() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (hook, _, delivery) = seeded(&harness, &owner).await;
    harness.registry.delete(hook.id, &owner).await.unwrap();

    coordinator(&harness, RetryPolicy::default())
        .process_pending_deliveries(10)
        .await
        .unwrap();

    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.last_error.as_deref(), Some(WEBHOOK_MISSING_ERROR));
    assert!(harness.ledger.list_pending(10).await.unwrap().is_empty());
}

async fn deactivate(harness: &Harness, hook: &Webhook) {
    harness
        .registry
        .modify(
            hook.id,
            &hook.tenant_id,
            WebhookUpdate {
                status: Some(WebhookStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_scans_do_not_deliver_to_inactive_webhook() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (hook, _, pending) = seeded(&harness, &owner).await;
    let evt = event(&owner, "user.created");
    harness.events.insert_if_absent(&evt).await.unwrap();
    let failed = harness.ledger.create_pending(&hook, &evt).await.unwrap();
    fail_once(&harness, &failed).await;
    deactivate(&harness, &hook).await;

    let retry = coordinator(&harness, RetryPolicy::default());
    assert_eq!(retry.process_pending_deliveries(10).await.unwrap(), 0);
    assert_eq!(retry.retry_failed_deliveries(10).await.unwrap(), 0);

    for id in [pending.id, failed.id] {
        let stored = harness.ledger.get(id, &owner).await.unwrap();
        assert!(stored.is_dead(harness.ledger.max_attempts()));
        assert_eq!(stored.last_error.as_deref(), Some(WEBHOOK_INACTIVE_ERROR));
    }
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_process_pending_recovers_interrupted_attempts() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    harness.ledger.claim(&delivery).await.unwrap().unwrap();

    let immediate = RetryCoordinator::new(
        harness.registry.clone(),
        harness.ledger.clone(),
        harness.events.clone(),
        harness.executor.clone(),
        RetryPolicy::default(),
        RecoveryConfig {
            stale_after_seconds: 0,
            ..Default::default()
        },
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    immediate.process_pending_deliveries(10).await.unwrap();

    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(
        stored.last_error.as_deref(),
        Some(crate::ledger::INTERRUPTED_ERROR)
    );

    // Recovered records are picked up by the failed-delivery retry
    let retried = immediate.retry_failed_deliveries(10).await.unwrap();
    assert_eq!(retried, 1);
    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Success);
    assert_eq!(stored.attempt_count, 2);
}

#[tokio::test]
async fn test_fresh_in_flight_attempts_are_left_alone() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    harness.ledger.claim(&delivery).await.unwrap().unwrap();

    let processed = coordinator(&harness, RetryPolicy::default())
        .process_pending_deliveries(10)
        .await
        .unwrap();

    assert_eq!(processed, 0);
    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::InFlight);
}

// ----------------------------------------------------------------------------
// Failed retries
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_retry_failed_stops_at_max_attempts() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    let coordinator = coordinator(&harness, RetryPolicy::default());

    fail_once(&harness, &delivery).await;
    for _ in 0..10 {
        harness.transport.respond_with(500, "still down");
        coordinator.retry_failed_deliveries(10).await.unwrap();
    }

    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempt_count, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(
        harness.transport.requests().len() as u32,
        DEFAULT_MAX_ATTEMPTS - 1
    );

    let webhook = harness.registry.get(delivery.webhook_id, &owner).await.unwrap();
    assert_eq!(webhook.failure_count as u32, DEFAULT_MAX_ATTEMPTS - 1);
}

#[tokio::test]
async fn test_retry_failed_respects_backoff() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;

    let patient = coordinator(
        &harness,
        RetryPolicy::exponential(Duration::from_secs(3600), Duration::from_secs(3600), 2.0),
    );

    assert_eq!(patient.retry_failed_deliveries(10).await.unwrap(), 0);
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_retry_failed_success_updates_counters() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (hook, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;

    let processed = coordinator(&harness, RetryPolicy::default())
        .retry_failed_deliveries(10)
        .await
        .unwrap();

    assert_eq!(processed, 1);
    let stored = harness.registry.get(hook.id, &owner).await.unwrap();
    assert_eq!(stored.success_count, 1);
}

// ----------------------------------------------------------------------------
// Manual retry
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_manual_retry_of_failed_delivery_succeeds() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;

    // Backoff is ignored for manual retries
    let patient = coordinator(
        &harness,
        RetryPolicy::exponential(Duration::from_secs(3600), Duration::from_secs(3600), 2.0),
    );
    let retried = patient.retry_delivery(delivery.id, &owner).await.unwrap();

    assert_eq!(retried.status, DeliveryStatus::Success);
    assert_eq!(retried.attempt_count, 2);
}

#[tokio::test]
async fn test_manual_retry_rejects_inactive_webhook() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (hook, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;
    deactivate(&harness, &hook).await;
    let sent_before = harness.transport.requests().len();

    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(delivery.id, &owner)
        .await;

    assert!(matches!(result, Err(HooklineError::Validation(_))));
    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.last_error.as_deref(), Some(WEBHOOK_INACTIVE_ERROR));
    assert_eq!(harness.transport.requests().len(), sent_before);
}

#[tokio::test]
async fn test_manual_retry_rejects_non_failed_delivery() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;

    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(delivery.id, &owner)
        .await;

    assert!(matches!(result, Err(HooklineError::Validation(_))));
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_manual_retry_rejects_exhausted_delivery() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    let dead = harness
        .ledger
        .mark_dead(&delivery, "gave up")
        .await
        .unwrap()
        .unwrap();

    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(dead.id, &owner)
        .await;

    assert!(matches!(
        result,
        Err(HooklineError::Validation(ValidationError::InvalidState { .. }))
    ));
}

#[tokio::test]
async fn test_manual_retry_by_other_tenant_is_denied() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;

    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(delivery.id, &tenant("tenant-b"))
        .await;

    assert!(matches!(result, Err(HooklineError::Authorization { .. })));
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn test_manual_retry_of_unknown_delivery_is_not_found() {
    let harness = Harness::new();

    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(DeliveryId::new(), &tenant("tenant-a"))
        .await;

    assert!(matches!(result, Err(HooklineError::NotFound { .. })));
}

#[tokio::test]
async fn test_manual_retry_with_missing_event_marks_dead() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, evt, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;
    harness.events.remove(evt.id);

    let coordinator = coordinator(&harness, RetryPolicy::default());
    let result = coordinator.retry_delivery(delivery.id, &owner).await;

    assert!(matches!(
        result,
        Err(HooklineError::NotFound { resource: "event", .. })
    ));

    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert!(stored.is_dead(harness.ledger.max_attempts()));

    // Dead records are excluded from automatic retry
    assert_eq!(coordinator.retry_failed_deliveries(10).await.unwrap(), 0);
}

#[tokio::test]
async fn test_manual_retry_reports_transport_failure() {
    let harness = Harness::new();
    let owner = tenant("tenant-a");
    let (_, _, delivery) = seeded(&harness, &owner).await;
    fail_once(&harness, &delivery).await;

    harness
        .transport
        .fail_with(TransportError::connect("connection failed: refused"));
    let result = coordinator(&harness, RetryPolicy::default())
        .retry_delivery(delivery.id, &owner)
        .await;

    assert!(matches!(result, Err(HooklineError::Transport { .. })));
    let stored = harness.ledger.get(delivery.id, &owner).await.unwrap();
    assert_eq!(stored.attempt_count, 2);
    assert_eq!(stored.response_code, 0);
}
