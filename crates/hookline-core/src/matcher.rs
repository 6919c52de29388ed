//! Event to subscription matching.

use crate::{event::Event, registry::WebhookRegistry, webhook::Webhook, HooklineResult};
use tracing::debug;

/// Finds the webhooks that should receive an event
#[derive(Clone)]
pub struct EventMatcher {
    registry: WebhookRegistry,
}

impl EventMatcher {
    pub fn new(registry: WebhookRegistry) -> Self {
        Self { registry }
    }

    /// Active webhooks of the event's tenant subscribed to its type
    ///
    /// Storage results are re-checked against [`Webhook::accepts`], so a
    /// backend that filters loosely never widens the match. Ordered by
    /// creation time.
    pub async fn match_event(&self, event: &Event) -> HooklineResult<Vec<Webhook>> {
        let candidates = self
            .registry
            .list_by_event_type(&event.event_type, &event.tenant_id)
            .await?;

        let candidate_count = candidates.len();
        let mut matched: Vec<Webhook> = candidates
            .into_iter()
            .filter(|webhook| webhook.accepts(event))
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if matched.len() != candidate_count {
            debug!(
                event_id = %event.id,
                discarded = candidate_count - matched.len(),
                "Discarded webhooks that do not accept the event"
            );
        }

        Ok(matched)
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
