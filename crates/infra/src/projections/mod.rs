//! Read model builders.
//!
//! All projections are:
//! - **Rebuildable**: reconstructed from the event store or the movement ledger
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: replays at or below the cursor are skipped

pub mod aggregate_state;
pub mod shifts;
pub mod stock_levels;
pub mod transfers;

use thiserror::Error;

use posledger_events::ProjectionError;

use crate::event_store::EventStoreError;
use crate::ledger::LedgerError;

pub use aggregate_state::AggregateProjection;
pub use shifts::ShiftsProjection;
pub use stock_levels::StockLevelsProjection;
pub use transfers::TransferReconciler;

#[derive(Debug, Error)]
pub enum ProjectionFailure {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error(transparent)]
    Sequence(#[from] ProjectionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("read model lock poisoned")]
    Poisoned,
}
