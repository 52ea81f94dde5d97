//! Append-only event store boundary for aggregate streams.
//!
//! Stock movements do not go through here; they live in the movement ledger
//! (`crate::ledger`), which has its own global ordering and idempotency.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
