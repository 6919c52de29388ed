//! Webhook subscription records.
//!
//! A [`Webhook`] is a tenant-owned subscription that says "POST events of these
//! types to this URL, signed with this secret". Validation of URL, secret and
//! event types lives here so that every entry point applies the same rules.

use crate::{event::Event, TenantId, Timestamp, ValidationError, WebhookId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;
use zeroize::Zeroizing;

/// Maximum length of a single event type name
pub const MAX_EVENT_TYPE_LENGTH: usize = 128;

/// Maximum length of a signing secret
pub const MAX_SECRET_LENGTH: usize = 256;

/// Maximum length of a target URL
pub const MAX_URL_LENGTH: usize = 2048;

// ============================================================================
// Status
// ============================================================================

/// Whether a webhook currently receives deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Active,
    Inactive,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Secret
// ============================================================================

/// Shared secret used to sign payloads for one webhook
///
/// # Security
/// - Memory is zeroed on drop
/// - Never serialized and redacted from `Debug` output
#[derive(Clone)]
pub struct WebhookSecret(Zeroizing<String>);

impl WebhookSecret {
    /// Create a secret, rejecting empty or oversized values
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = Zeroizing::new(value.into());

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "secret".to_string(),
            });
        }

        if value.len() > MAX_SECRET_LENGTH {
            return Err(ValidationError::TooLong {
                field: "secret".to_string(),
                max_length: MAX_SECRET_LENGTH,
            });
        }

        Ok(Self(value))
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        self.0.as_str()
    }

    /// Get secret as bytes
    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, secrets are validated non-empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Event type set
// ============================================================================

/// Non-empty, de-duplicated set of event type names a webhook subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct EventTypeSet(BTreeSet<String>);

impl EventTypeSet {
    /// Build a set from names, trimming and validating each one
    pub fn new<I, S>(types: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for event_type in types {
            let event_type = event_type.into();
            let event_type = event_type.trim();
            validate_event_type(event_type, "event_types")?;
            set.insert(event_type.to_string());
        }

        if set.is_empty() {
            return Err(ValidationError::Required {
                field: "event_types".to_string(),
            });
        }

        Ok(Self(set))
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.0.contains(event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl TryFrom<Vec<String>> for EventTypeSet {
    type Error = ValidationError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventTypeSet> for Vec<String> {
    fn from(value: EventTypeSet) -> Self {
        value.0.into_iter().collect()
    }
}

/// Validate a single event type name
///
/// # Validation Rules
/// - Must be 1-128 characters
/// - Must contain only printable ASCII characters without whitespace
pub fn validate_event_type(event_type: &str, field: &str) -> Result<(), ValidationError> {
    if event_type.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if event_type.len() > MAX_EVENT_TYPE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length: MAX_EVENT_TYPE_LENGTH,
        });
    }

    if !event_type.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidCharacters {
            field: field.to_string(),
            invalid_chars: "non-ASCII or whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validate a delivery target URL
///
/// The URL must be absolute, use `http` or `https`, and name a host.
pub fn validate_target_url(value: &str) -> Result<Url, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: "url".to_string(),
        });
    }

    if value.len() > MAX_URL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "url".to_string(),
            max_length: MAX_URL_LENGTH,
        });
    }

    let parsed = Url::parse(value).map_err(|e| ValidationError::InvalidFormat {
        field: "url".to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidFormat {
            field: "url".to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidFormat {
            field: "url".to_string(),
            message: "missing host".to_string(),
        });
    }

    Ok(parsed)
}

// ============================================================================
// Webhook record
// ============================================================================

/// Tenant-owned subscription to one or more event types
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub url: String,
    pub secret: WebhookSecret,
    pub event_types: EventTypeSet,
    pub status: WebhookStatus,
    /// Number of successful delivery attempts
    pub success_count: u64,
    /// Number of failed delivery attempts
    pub failure_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Webhook {
    /// Create a new active webhook with zeroed counters
    pub fn new(
        tenant_id: TenantId,
        url: impl Into<String>,
        secret: WebhookSecret,
        event_types: EventTypeSet,
    ) -> Result<Self, ValidationError> {
        let url = url.into();
        validate_target_url(&url)?;

        let now = Timestamp::now();
        Ok(Self {
            id: WebhookId::new(),
            tenant_id,
            url,
            secret,
            event_types,
            status: WebhookStatus::Active,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Set the initial status
    pub fn with_status(mut self, status: WebhookStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == WebhookStatus::Active
    }

    /// Check that the record still satisfies the creation rules
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_target_url(&self.url)?;
        if self.event_types.is_empty() {
            return Err(ValidationError::Required {
                field: "event_types".to_string(),
            });
        }
        Ok(())
    }

    /// Whether this webhook should receive a delivery for `event`
    ///
    /// Requires the webhook to be active, owned by the event's tenant, and
    /// subscribed to the event's type.
    pub fn accepts(&self, event: &Event) -> bool {
        self.is_active()
            && self.tenant_id == event.tenant_id
            && self.event_types.contains(&event.event_type)
    }

    /// Apply a partial update in place, leaving counters and identity untouched
    pub fn apply(&mut self, update: WebhookUpdate) -> Result<(), ValidationError> {
        if let Some(url) = update.url {
            validate_target_url(&url)?;
            self.url = url;
        }
        if let Some(secret) = update.secret {
            self.secret = secret;
        }
        if let Some(event_types) = update.event_types {
            self.event_types = event_types;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }
}

/// Partial modification of a webhook's mutable attributes
#[derive(Debug, Clone, Default)]
pub struct WebhookUpdate {
    pub url: Option<String>,
    pub secret: Option<WebhookSecret>,
    pub event_types: Option<EventTypeSet>,
    pub status: Option<WebhookStatus>,
}

impl WebhookUpdate {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.secret.is_none()
            && self.event_types.is_none()
            && self.status.is_none()
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
