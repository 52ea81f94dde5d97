//! Inventory domain module.
//!
//! Business rules for the stock movement ledger, implemented as deterministic
//! domain logic (no IO, no HTTP, no storage):
//!
//! - `movement`: the immutable ledger record and its validation
//! - `stock`: the fold from movements to current stock, and the low-stock rule
//! - `transfer`: pairing `transfer_out` / `transfer_in` into logical transfers
//! - `catalog`, `outlet`, `supplier`: event-sourced reference aggregates

pub mod catalog;
pub mod movement;
pub mod outlet;
pub mod stock;
pub mod supplier;
pub mod transfer;

pub use catalog::{
    AddVariation, CatalogCommand, CatalogEvent, CatalogProduct, ChangeStockSettings,
    ProductRegistered, RegisterProduct, SettingsTarget, StockSettings, StockSettingsChanged,
    Variation, VariationAdded,
};
pub use movement::{
    ledger_precision, validate_idempotency_key, MovementType, NewMovement, QuantitySign,
    StockMovement,
};
pub use outlet::{Outlet, OutletCommand, OutletEvent};
pub use stock::{LowStock, StockBalance, StockKey, StockLevels, StockPolicy, StockUnit, TypeTotals};
pub use supplier::{Supplier, SupplierCommand, SupplierEvent};
pub use transfer::{
    MatchedBy, ReferenceThenHeuristic, StrictReference, Transfer, TransferMatcher,
    TransferReport, TransferStatus, UnmatchedInbound, reconcile,
};
