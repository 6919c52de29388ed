//! Fan-out of an event to its matching webhooks.

use crate::{
    event::{Event, EventStore},
    ledger::DeliveryLedger,
    matcher::EventMatcher,
    worker_pool::{DeliveryJob, DeliveryScheduler},
    DeliveryId, EventId, HooklineResult, ValidationError,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What happened to an event during dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub event_id: EventId,
    /// Webhooks that accepted the event
    pub matched: usize,
    /// Deliveries handed to the worker pool
    pub scheduled: usize,
    /// Deliveries recorded but left pending for the recovery scan
    pub deferred: usize,
    /// Matches for which no delivery could be recorded
    pub skipped: usize,
    pub delivery_ids: Vec<DeliveryId>,
}

impl DispatchSummary {
    fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            matched: 0,
            scheduled: 0,
            deferred: 0,
            skipped: 0,
            delivery_ids: Vec::new(),
        }
    }
}

/// Records one pending delivery per matching webhook and schedules it
pub struct DeliveryDispatcher {
    matcher: EventMatcher,
    ledger: DeliveryLedger,
    events: Arc<dyn EventStore>,
    scheduler: Arc<dyn DeliveryScheduler>,
}

impl DeliveryDispatcher {
    pub fn new(
        matcher: EventMatcher,
        ledger: DeliveryLedger,
        events: Arc<dyn EventStore>,
        scheduler: Arc<dyn DeliveryScheduler>,
    ) -> Self {
        Self {
            matcher,
            ledger,
            events,
            scheduler,
        }
    }

    /// Dispatch `event` to every matching webhook
    ///
    /// The event is stored first so that retries can re-send it. An id that is
    /// already stored is dispatched again only when it belongs to the same
    /// tenant with the same type and payload; the stored copy is what gets
    /// sent. Returns once every delivery is recorded and handed off; no HTTP
    /// call is awaited. A failure to record one delivery is logged and does not
    /// stop the others.
    #[instrument(
        skip(self, event),
        fields(event_id = %event.id, event_type = %event.event_type, tenant_id = %event.tenant_id)
    )]
    pub async fn dispatch(&self, event: &Event) -> HooklineResult<DispatchSummary> {
        event.validate()?;
        let event = self.record(event).await?;
        let event = &event;

        let webhooks = self.matcher.match_event(event).await?;
        let mut summary = DispatchSummary::new(event.id);
        summary.matched = webhooks.len();

        for webhook in webhooks {
            let delivery = match self.ledger.create_pending(&webhook, event).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(webhook_id = %webhook.id, error = %e, "Failed to record delivery");
                    summary.skipped += 1;
                    continue;
                }
            };

            summary.delivery_ids.push(delivery.id);
            let delivery_id = delivery.id;

            let job = DeliveryJob {
                webhook,
                event: event.clone(),
                delivery,
            };

            match self.scheduler.schedule(job).await {
                Ok(()) => summary.scheduled += 1,
                Err(e) => {
                    warn!(
                        delivery_id = %delivery_id,
                        error = %e,
                        "Delivery left pending for recovery"
                    );
                    summary.deferred += 1;
                }
            }
        }

        info!(
            matched = summary.matched,
            scheduled = summary.scheduled,
            deferred = summary.deferred,
            skipped = summary.skipped,
            "Event dispatched"
        );
        Ok(summary)
    }

    /// Store `event`, or return the stored copy of a repeated id
    async fn record(&self, event: &Event) -> HooklineResult<Event> {
        if self.events.insert_if_absent(event).await? {
            return Ok(event.clone());
        }

        // A foreign tenant's id gets the same answer as a conflicting one
        match self.events.get(event.id, &event.tenant_id).await? {
            Some(stored)
                if stored.event_type == event.event_type && stored.payload == event.payload =>
            {
                debug!("Event already recorded, dispatching again");
                Ok(stored)
            }
            _ => {
                warn!("Event id reused with different content");
                Err(ValidationError::InvalidState {
                    field: "id".to_string(),
                    message: format!("event id {} is already in use", event.id),
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
