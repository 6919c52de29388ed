//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the persistence and HTTP transport interfaces.

pub mod memory_store;
pub mod reqwest_transport;

pub use memory_store::{InMemoryDeliveryStore, InMemoryEventStore, InMemoryWebhookStore};
pub use reqwest_transport::{ReqwestTransport, TransportConfig};
