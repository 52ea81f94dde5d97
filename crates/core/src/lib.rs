//! `posledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the ledger and till
//! modules (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{Conflict, DomainError, DomainResult};
pub use id::{
    AggregateId, MovementId, OutletId, ProductId, ShiftId, SupplierId, TenantId, TillId, UserId,
    VariationId,
};
pub use money::Money;
