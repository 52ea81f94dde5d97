//! Append-only stock movement ledger.
//!
//! The ledger is the single source of truth for stock. Every movement gets a
//! store-wide monotonic `position`; projections use it as their watermark.
//! Appends carrying an idempotency key are deduplicated per tenant: the same
//! key with the same content returns the original movement, the same key with
//! different content is rejected.

pub mod in_memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use posledger_core::{Conflict, DomainError, TenantId};
use posledger_inventory::{validate_idempotency_key, NewMovement, StockMovement};

pub use in_memory::InMemoryMovementLedger;
pub use postgres::PostgresMovementLedger;
pub use query::{MovementFilter, MovementPage, Pagination};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failure; safe to retry with the same idempotency key.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub movement: StockMovement,
    /// True when an earlier append with the same key was returned instead.
    pub replayed: bool,
}

#[async_trait]
pub trait MovementLedger: Send + Sync {
    /// Validate and append one movement.
    async fn append(
        &self,
        tenant_id: TenantId,
        movement: NewMovement,
        idempotency_key: Option<String>,
    ) -> Result<AppendOutcome, LedgerError>;

    async fn query(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError>;

    /// Movements with `position > after`, oldest first, at most `limit`.
    async fn read_after(
        &self,
        tenant_id: TenantId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StockMovement>, LedgerError>;

    /// Highest position recorded for the tenant (0 if none).
    async fn head_position(&self, tenant_id: TenantId) -> Result<u64, LedgerError>;
}

/// Normalize and validate an incoming movement and its key.
pub(crate) fn prepare(
    movement: NewMovement,
    idempotency_key: Option<String>,
) -> Result<(NewMovement, Option<String>), DomainError> {
    let movement = movement.normalized();
    movement.validate()?;
    let key = match idempotency_key {
        Some(k) => {
            validate_idempotency_key(&k)?;
            Some(k.trim().to_string())
        }
        None => None,
    };
    Ok((movement, key))
}

/// Resolve an append whose key is already taken.
pub(crate) fn replay(
    existing: StockMovement,
    incoming: &NewMovement,
    key: &str,
) -> Result<AppendOutcome, LedgerError> {
    if existing.same_content(incoming) {
        Ok(AppendOutcome {
            movement: existing,
            replayed: true,
        })
    } else {
        Err(DomainError::conflict(Conflict::IdempotencyKeyReused(key.to_string())).into())
    }
}
