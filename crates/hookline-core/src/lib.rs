//! # Hookline Core
//!
//! Business logic for delivering tenant events to registered webhook subscriptions.
//!
//! This crate matches incoming events to active webhooks, records one delivery per
//! match, signs and POSTs the payload through a bounded worker pool, and re-attempts
//! failed deliveries under a maximum-attempt policy.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions ([`WebhookStore`],
//!   [`DeliveryStore`], [`EventStore`], [`HttpTransport`])
//! - Infrastructure implementations live in [`adapters`] and are injected at runtime
//! - [`WebhookService`] is the single entry point used by other layers
//!
//! ## Usage
//!
//! ```rust
//! use hookline_core::{EventId, TenantId};
//!
//! let event_id = EventId::new();
//! let tenant = TenantId::new("tenant-a").unwrap();
//! assert_eq!(tenant.as_str(), "tenant-a");
//! assert!(!event_id.as_str().is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use ulid::Ulid;

/// Standard result type for hookline operations
pub type HooklineResult<T> = Result<T, HooklineError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

macro_rules! ulid_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new unique identifier
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Get string representation
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
                    expected: concat!($label, " in ULID format").to_string(),
                    actual: s.to_string(),
                })?;
                Ok(Self(ulid))
            }
        }
    };
}

ulid_identifier!(
    /// Unique identifier for a webhook subscription
    WebhookId,
    "webhook id"
);

ulid_identifier!(
    /// Unique identifier for a system event
    ///
    /// Uses ULID for lexicographic sorting and global uniqueness.
    EventId,
    "event id"
);

ulid_identifier!(
    /// Unique identifier for a delivery record
    DeliveryId,
    "delivery id"
);

/// Identifier of the tenant owning webhooks, events and deliveries
///
/// Issued by the authentication layer; this crate only checks that it is
/// well formed and compares it for ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create new tenant ID with validation
    ///
    /// # Validation Rules
    /// - Must be 1-128 characters
    /// - Must contain only printable ASCII characters without whitespace
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "tenant_id".to_string(),
            });
        }

        if value.len() > 128 {
            return Err(ValidationError::TooLong {
                field: "tenant_id".to_string(),
                max_length: 128,
            });
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "tenant_id".to_string(),
                invalid_chars: "non-ASCII or whitespace".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Subtract duration from timestamp
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 - chrono_duration)
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Page selection for list operations (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Items per page when the caller does not specify one
    pub const DEFAULT_PER_PAGE: u32 = 50;

    /// Upper bound on items per page
    pub const MAX_PER_PAGE: u32 = 200;

    /// Create a validated page request
    pub fn new(page: u32, per_page: u32) -> Result<Self, ValidationError> {
        if page == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "page".to_string(),
                message: "pages are numbered from 1".to_string(),
            });
        }

        if per_page == 0 || per_page > Self::MAX_PER_PAGE {
            return Err(ValidationError::InvalidFormat {
                field: "per_page".to_string(),
                message: format!("must be between 1 and {}", Self::MAX_PER_PAGE),
            });
        }

        Ok(Self { page, per_page })
    }

    /// Number of items to skip
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }

    /// Maximum number of items to return
    pub fn limit(&self) -> usize {
        self.per_page as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }
}

/// One page of a list result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
}

impl<T> Page<T> {
    /// Cut a page out of an already ordered result set
    pub fn from_ordered(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();

        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
        }
    }

    /// Convert the items of the page
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that may succeed on a later attempt
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Cross-tenant access attempts
    Security,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },

    #[error("Invalid state for '{field}': {message}")]
    InvalidState { field: String, message: String },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Error returned by persistence contracts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{resource} already exists: {id}")]
    AlreadyExists { resource: &'static str, id: String },

    #[error("Storage backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Top-level error type for hookline operations
#[derive(Debug, thiserror::Error)]
pub enum HooklineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Tenant '{tenant_id}' is not authorized to access {resource} {id}")]
    Authorization {
        resource: &'static str,
        id: String,
        tenant_id: String,
    },

    #[error("Delivery to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Remote endpoint responded with HTTP {status}")]
    RemoteRejection { status: u16, body_excerpt: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HooklineError {
    /// Build a not-found error for a resource
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Check if error is transient and a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::RemoteRejection { status, .. } => *status >= 500 || *status == 429,
            Self::Internal { .. } => true,
            Self::Validation(_) => false,
            Self::NotFound { .. } => false,
            Self::Authorization { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Authorization { .. } => ErrorCategory::Security,
            _ if self.is_transient() => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Whether the error describes the outcome of an HTTP attempt rather than a
    /// failure to make one
    pub fn is_delivery_outcome(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RemoteRejection { .. })
    }
}

impl From<StorageError> for HooklineError {
    fn from(error: StorageError) -> Self {
        Self::Internal {
            message: error.to_string(),
        }
    }
}

/// Fail with an authorization error unless `caller` owns the record
pub(crate) fn ensure_tenant(
    resource: &'static str,
    id: impl fmt::Display,
    owner: &TenantId,
    caller: &TenantId,
) -> HooklineResult<()> {
    if owner == caller {
        return Ok(());
    }

    Err(HooklineError::Authorization {
        resource,
        id: id.to_string(),
        tenant_id: caller.to_string(),
    })
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook subscription records and their validation rules
pub mod webhook;

/// Events and the event persistence contract
pub mod event;

/// Tenant-scoped webhook registry
pub mod registry;

/// Delivery records and their lifecycle transitions
pub mod ledger;

/// HMAC-SHA256 payload signing
pub mod signer;

/// Event to subscription matching
pub mod matcher;

/// Signed HTTP delivery of a single attempt
pub mod executor;

/// Bounded hand-off between dispatch and execution
pub mod worker_pool;

/// Fan-out of an event to its matching webhooks
pub mod dispatcher;

/// Crash recovery and retry of failed deliveries
pub mod retry;

/// Facade exposing the produced interface
pub mod service;

/// Infrastructure adapters (persistence and HTTP transport)
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{
    InMemoryDeliveryStore, InMemoryEventStore, InMemoryWebhookStore, ReqwestTransport,
    TransportConfig,
};
pub use dispatcher::{DeliveryDispatcher, DispatchSummary};
pub use event::{Event, EventStore};
pub use executor::{
    DeliveryExecutor, ExecutorConfig, HttpTransport, OutboundRequest, TransportError,
    TransportErrorKind, TransportResponse,
};
pub use ledger::{
    AttemptOutcome, DeliveryLedger, DeliveryStatus, DeliveryStore, WebhookDelivery,
    DEFAULT_MAX_ATTEMPTS,
};
pub use matcher::EventMatcher;
pub use registry::{WebhookRegistry, WebhookStore};
pub use retry::{RecoveryConfig, RetryCoordinator, RetryPolicy};
pub use service::{DeliveryConfig, Persistence, WebhookService};
pub use webhook::{EventTypeSet, Webhook, WebhookSecret, WebhookStatus, WebhookUpdate};
pub use worker_pool::{
    DeliveryJob, DeliveryScheduler, DeliveryWorkerPool, EnqueueError, WorkerPoolConfig,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

#[cfg(test)]
mod test_support;
