//! Events produced elsewhere in the platform and delivered to subscribers.

use crate::{webhook::validate_event_type, EventId, StorageError, TenantId, Timestamp, ValidationError};
use async_trait::async_trait;
use bytes::Bytes;

/// A tenant-scoped occurrence that subscribers may be notified about
///
/// The payload is an opaque JSON document that is forwarded byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub event_type: String,
    pub tenant_id: TenantId,
    pub payload: Bytes,
    pub created_at: Timestamp,
}

impl Event {
    /// Create an event with a fresh identifier
    ///
    /// Surrounding whitespace is trimmed from the event type.
    pub fn new(event_type: impl Into<String>, tenant_id: TenantId, payload: impl Into<Bytes>) -> Self {
        let event_type: String = event_type.into();
        Self {
            id: EventId::new(),
            event_type: event_type.trim().to_string(),
            tenant_id,
            payload: payload.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Use a caller-provided identifier
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Check that the event can be dispatched
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_event_type(&self.event_type, "event_type")
    }
}

/// Persistence contract for events
///
/// Events are stored so that retries and crash recovery can re-send the
/// original payload.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store the event unless one with the same id exists
    ///
    /// Returns `true` if the event was inserted.
    async fn insert_if_absent(&self, event: &Event) -> Result<bool, StorageError>;

    /// Fetch an event owned by `tenant_id`
    async fn get(&self, id: EventId, tenant_id: &TenantId) -> Result<Option<Event>, StorageError>;
}
