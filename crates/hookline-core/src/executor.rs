//! Signed HTTP delivery of a single attempt.
//!
//! [`DeliveryExecutor`] turns a claimed (in-flight) delivery into one HTTP POST,
//! then records the outcome on the delivery record and the webhook counters.
//! The network call goes through the [`HttpTransport`] trait so that tests and
//! alternative clients can be injected.

use crate::{
    event::Event,
    ledger::{AttemptOutcome, DeliveryLedger, WebhookDelivery},
    registry::WebhookRegistry,
    signer::{self, EVENT_ID_HEADER, EVENT_TYPE_HEADER, SIGNATURE_HEADER},
    webhook::Webhook,
    HooklineError, HooklineResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Default cap on the stored response body
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 4096;

// ============================================================================
// Transport contract
// ============================================================================

/// A fully built outbound POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and (possibly truncated) body of a received response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why no response was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
}

/// Failure to obtain any HTTP response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Request,
            message: message.into(),
        }
    }
}

/// Outbound HTTP client used for deliveries
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `request` and return the status with at most `max_body_bytes` of body
    async fn post(
        &self,
        request: OutboundRequest,
        max_body_bytes: usize,
    ) -> Result<TransportResponse, TransportError>;
}

// ============================================================================
// Executor
// ============================================================================

/// Executor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bytes of response body kept on the delivery record
    pub max_response_body_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

/// Performs one signed delivery attempt and records its outcome
pub struct DeliveryExecutor {
    transport: Arc<dyn HttpTransport>,
    registry: WebhookRegistry,
    ledger: DeliveryLedger,
    config: ExecutorConfig,
}

impl DeliveryExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        registry: WebhookRegistry,
        ledger: DeliveryLedger,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            ledger,
            config,
        }
    }

    /// Build the signed POST for `event` to `webhook`
    pub fn build_request(webhook: &Webhook, event: &Event) -> HooklineResult<OutboundRequest> {
        let signature = signer::sign(&webhook.secret, &event.payload)?;

        Ok(OutboundRequest {
            url: webhook.url.clone(),
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                (SIGNATURE_HEADER, signature),
                (EVENT_TYPE_HEADER, event.event_type.clone()),
                (EVENT_ID_HEADER, event.id.to_string()),
            ],
            body: event.payload.clone(),
        })
    }

    /// Take ownership of the next attempt of `delivery`
    ///
    /// Returns `None` if another worker claimed it or it has no attempts left.
    pub async fn claim(&self, delivery: &WebhookDelivery) -> HooklineResult<Option<WebhookDelivery>> {
        self.ledger.claim(delivery).await
    }

    /// Run the attempt held by `claimed` and record its outcome
    ///
    /// On a 2xx the updated record is returned. A non-2xx answer yields
    /// [`HooklineError::RemoteRejection`] and a missing answer yields
    /// [`HooklineError::Transport`], in both cases after the failure was
    /// recorded. Failures to persist the outcome yield
    /// [`HooklineError::Internal`].
    #[instrument(
        skip(self, webhook, event, claimed),
        fields(
            delivery_id = %claimed.id,
            webhook_id = %webhook.id,
            event_id = %event.id,
            attempt = claimed.attempt_count
        )
    )]
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        event: &Event,
        claimed: &WebhookDelivery,
    ) -> HooklineResult<WebhookDelivery> {
        let outcome = match Self::build_request(webhook, event) {
            Ok(request) => self.send(request).await,
            Err(e) => AttemptOutcome::TransportFailed {
                message: format!("failed to sign payload: {}", e),
            },
        };

        match &outcome {
            AttemptOutcome::Delivered { status_code, .. } => {
                info!(status = status_code, "Delivery succeeded");
            }
            AttemptOutcome::Rejected { status_code, .. } => {
                warn!(status = status_code, "Delivery rejected by receiver");
            }
            AttemptOutcome::TransportFailed { message } => {
                warn!(error = %message, "Delivery failed without a response");
            }
        }

        let recorded = self.ledger.record_outcome(claimed, &outcome).await;
        let counted = self
            .registry
            .record_outcome(webhook.id, outcome.is_success())
            .await;

        let updated = match recorded {
            Ok(updated) => updated,
            Err(e) => {
                error!(error = %e, "Failed to record delivery outcome");
                return Err(e);
            }
        };

        match counted {
            Ok(()) => {}
            // Webhook deleted while the attempt ran; nothing left to count against
            Err(HooklineError::NotFound { .. }) => {}
            Err(e) => {
                error!(error = %e, "Failed to update webhook counters");
                return Err(e);
            }
        }

        match outcome {
            AttemptOutcome::Delivered { .. } => Ok(updated),
            AttemptOutcome::Rejected {
                status_code,
                body_excerpt,
            } => Err(HooklineError::RemoteRejection {
                status: status_code,
                body_excerpt,
            }),
            AttemptOutcome::TransportFailed { message } => Err(HooklineError::Transport {
                url: webhook.url.clone(),
                message,
            }),
        }
    }

    async fn send(&self, request: OutboundRequest) -> AttemptOutcome {
        let limit = self.config.max_response_body_bytes;

        match self.transport.post(request, limit).await {
            Ok(response) => {
                let body_excerpt = excerpt(&response.body, limit);
                if response.is_success() {
                    AttemptOutcome::Delivered {
                        status_code: response.status,
                        body_excerpt,
                    }
                } else {
                    AttemptOutcome::Rejected {
                        status_code: response.status,
                        body_excerpt,
                    }
                }
            }
            Err(e) => AttemptOutcome::TransportFailed { message: e.message },
        }
    }
}

/// Lossy UTF-8 view of at most `limit` bytes of `body`
fn excerpt(body: &[u8], limit: usize) -> String {
    let end = body.len().min(limit);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
