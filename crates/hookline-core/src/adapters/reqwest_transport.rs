//! # Reqwest Transport
//!
//! Production [`HttpTransport`] backed by a shared `reqwest` client.
//!
//! Redirects are not followed and every request is bounded by the configured
//! timeout. The response body is read chunk by chunk and reading stops once
//! the caller's byte limit is reached.

use crate::executor::{HttpTransport, OutboundRequest, TransportError, TransportResponse};
use crate::HooklineError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout covering connect, send and response headers
    pub request_timeout_seconds: u64,

    /// User-Agent header sent with every delivery
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            user_agent: concat!("hookline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// [`HttpTransport`] implementation using `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, HooklineError> {
        Self::with_timeout(config, config.request_timeout())
    }

    /// Build with an explicit timeout, ignoring `request_timeout_seconds`
    pub fn with_timeout(config: &TransportConfig, timeout: Duration) -> Result<Self, HooklineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HooklineError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::timeout(format!(
                "request timed out after {}s",
                self.timeout.as_secs_f64()
            ))
        } else if error.is_connect() {
            TransportError::connect(format!("connection failed: {}", error))
        } else {
            TransportError::request(format!("request failed: {}", error))
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn post(
        &self,
        request: OutboundRequest,
        max_body_bytes: usize,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let mut response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let mut body = BytesMut::new();

        while body.len() < max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(max_body_bytes - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => {
                    // The status already arrived; keep what was read
                    debug!(error = %e, status, "Response body read interrupted");
                    break;
                }
            }
        }

        Ok(TransportResponse {
            status,
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
#[path = "reqwest_transport_tests.rs"]
mod tests;
