//! Event mechanics shared by the ledger and till modules.
//!
//! - `envelope`: tenant-scoped unit persisted to / published from a stream
//! - `bus`: pub/sub distribution after persistence
//! - `projection` + `runner`: read models folded from envelopes, with replay

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
pub use tenant::TenantScoped;
