//! Movement query types: filters and pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{OutletId, ProductId, VariationId};
use posledger_inventory::{MovementType, StockMovement};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self::bounded(limit, offset, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Like `new`, with configured default and cap.
    pub fn bounded(limit: Option<u32>, offset: Option<u32>, default: u32, max: u32) -> Self {
        Self {
            limit: limit.unwrap_or(default).clamp(1, max.max(1)),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for movement queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub outlet_id: Option<OutletId>,
    pub product_id: Option<ProductId>,
    pub variation_id: Option<VariationId>,
    /// Empty means all types.
    pub movement_types: Vec<MovementType>,
    pub reference_id: Option<String>,
    /// Inclusive lower bound on `occurred_at`.
    pub occurred_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `occurred_at`.
    pub occurred_to: Option<DateTime<Utc>>,
    /// Only movements after this ledger position.
    pub after_position: Option<u64>,
    pub newest_first: bool,
}

impl MovementFilter {
    pub fn of_type(movement_type: MovementType) -> Self {
        Self {
            movement_types: vec![movement_type],
            ..Default::default()
        }
    }

    pub fn transfers() -> Self {
        Self {
            movement_types: vec![MovementType::TransferOut, MovementType::TransferIn],
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &StockMovement) -> bool {
        self.outlet_id.is_none_or(|o| m.outlet_id == o)
            && self.product_id.is_none_or(|p| m.product_id == p)
            && self.variation_id.is_none_or(|v| m.variation_id == Some(v))
            && (self.movement_types.is_empty() || self.movement_types.contains(&m.movement_type))
            && self
                .reference_id
                .as_deref()
                .is_none_or(|r| m.reference_id.as_deref() == Some(r))
            && self.occurred_from.is_none_or(|from| m.occurred_at >= from)
            && self.occurred_to.is_none_or(|to| m.occurred_at < to)
            && self.after_position.is_none_or(|p| m.position > p)
    }
}

/// One page of movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<StockMovement>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<StockMovement>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (movements.len() as u64) < total;
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}
