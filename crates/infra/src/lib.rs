//! Infrastructure layer: stores, the command pipeline, read models and the
//! engine façade the HTTP surface is built on.

pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod ledger;
pub mod projections;
pub mod read_model;

pub use config::{EngineConfig, TransferMatching};
pub use engine::{Engine, FeedStatus, ShiftSummaryFeed, TenantScope};
pub use error::{EngineError, EngineResult};

#[cfg(test)]
mod integration_tests;
