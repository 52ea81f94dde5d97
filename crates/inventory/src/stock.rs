//! Stock aggregation: a pure fold from ledger movements to current stock.
//!
//! Current stock is never stored as a writable value. It is the signed sum of
//! movement deltas per `(outlet, product, variation)`, and anything derived
//! from it (low-stock flags, history totals) is recomputable from the ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{AggregateRoot, DomainError, DomainResult, OutletId, ProductId, VariationId};
use posledger_events::{EventEnvelope, Projection};

use crate::catalog::CatalogProduct;
use crate::movement::{MovementType, StockMovement};

/// Ledger key at which quantities are summed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub outlet_id: OutletId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
}

impl StockKey {
    pub fn of(movement: &StockMovement) -> Self {
        Self {
            outlet_id: movement.outlet_id,
            product_id: movement.product_id,
            variation_id: movement.variation_id,
        }
    }
}

/// Running totals per movement type (signed).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeTotals {
    pub sale: i64,
    pub purchase: i64,
    #[serde(rename = "return")]
    pub returned: i64,
    pub adjustment: i64,
    pub transfer_out: i64,
    pub transfer_in: i64,
}

impl TypeTotals {
    fn add(&mut self, movement_type: MovementType, quantity: i64) {
        let slot = match movement_type {
            MovementType::Sale => &mut self.sale,
            MovementType::Purchase => &mut self.purchase,
            MovementType::Return => &mut self.returned,
            MovementType::Adjustment => &mut self.adjustment,
            MovementType::TransferOut => &mut self.transfer_out,
            MovementType::TransferIn => &mut self.transfer_in,
        };
        *slot = slot.saturating_add(quantity);
    }

    fn merge(&mut self, other: &TypeTotals) {
        self.sale = self.sale.saturating_add(other.sale);
        self.purchase = self.purchase.saturating_add(other.purchase);
        self.returned = self.returned.saturating_add(other.returned);
        self.adjustment = self.adjustment.saturating_add(other.adjustment);
        self.transfer_out = self.transfer_out.saturating_add(other.transfer_out);
        self.transfer_in = self.transfer_in.saturating_add(other.transfer_in);
    }
}

/// Folded state for one key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockBalance {
    pub quantity: i64,
    pub movement_count: u64,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub totals_by_type: TypeTotals,
}

impl StockBalance {
    pub fn fold(&mut self, movement: &StockMovement) {
        self.quantity = self.quantity.saturating_add(movement.quantity);
        self.movement_count += 1;
        self.last_movement_at = Some(match self.last_movement_at {
            Some(prev) if prev > movement.occurred_at => prev,
            _ => movement.occurred_at,
        });
        self.totals_by_type
            .add(movement.movement_type, movement.quantity);
    }

    fn merge(&mut self, other: &StockBalance) {
        self.quantity = self.quantity.saturating_add(other.quantity);
        self.movement_count += other.movement_count;
        self.last_movement_at = self.last_movement_at.max(other.last_movement_at);
        self.totals_by_type.merge(&other.totals_by_type);
    }

    /// Negative stock is tolerated; it is surfaced, never rejected.
    pub fn is_negative(&self) -> bool {
        self.quantity < 0
    }
}

/// Pure stock fold for a single tenant.
///
/// `watermark` is the last ledger position folded; movements at or below it
/// are ignored, so re-delivering a movement is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StockLevels {
    balances: BTreeMap<StockKey, StockBalance>,
    watermark: u64,
}

impl StockLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a full movement history from empty.
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Self {
        let mut levels = Self::new();
        for m in movements {
            levels.apply_movement(m);
        }
        levels
    }

    /// Returns `false` when the movement was at or below the watermark.
    pub fn apply_movement(&mut self, movement: &StockMovement) -> bool {
        if movement.position <= self.watermark {
            return false;
        }
        self.balances
            .entry(StockKey::of(movement))
            .or_default()
            .fold(movement);
        self.watermark = movement.position;
        true
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn balance(&self, key: &StockKey) -> Option<&StockBalance> {
        self.balances.get(key)
    }

    pub fn balances(&self) -> impl Iterator<Item = (&StockKey, &StockBalance)> {
        self.balances.iter()
    }

    /// Stock for an exact ledger key; keys with no movements have stock 0.
    pub fn quantity(
        &self,
        outlet_id: OutletId,
        product_id: ProductId,
        variation_id: Option<VariationId>,
    ) -> i64 {
        self.balances
            .get(&StockKey {
                outlet_id,
                product_id,
                variation_id,
            })
            .map_or(0, |b| b.quantity)
    }

    /// Folded balance for a stock unit at an outlet.
    ///
    /// A product-level unit sums every movement of the product at the outlet,
    /// whatever variation it names.
    pub fn unit_balance(&self, outlet_id: OutletId, unit: StockUnit) -> StockBalance {
        let mut total = StockBalance::default();
        let lower = StockKey {
            outlet_id,
            product_id: unit.product_id(),
            variation_id: None,
        };
        for (key, balance) in self.balances.range(lower..) {
            if key.outlet_id != outlet_id || key.product_id != unit.product_id() {
                break;
            }
            let in_unit = match unit {
                StockUnit::Product { .. } => true,
                StockUnit::Variation { variation_id, .. } => key.variation_id == Some(variation_id),
            };
            if in_unit {
                total.merge(balance);
            }
        }
        total
    }

    /// Outlets that have at least one movement.
    pub fn outlets(&self) -> Vec<OutletId> {
        let mut outlets: Vec<_> = self.balances.keys().map(|k| k.outlet_id).collect();
        outlets.dedup();
        outlets
    }

    /// Evaluate low stock for every unit of `products` at `outlet_id`.
    pub fn low_stock<'a>(
        &self,
        outlet_id: OutletId,
        products: impl IntoIterator<Item = &'a CatalogProduct>,
    ) -> Vec<LowStock> {
        let mut low = Vec::new();
        for product in products {
            for policy in StockPolicy::units(product) {
                let quantity = self.unit_balance(outlet_id, policy.unit).quantity;
                if policy.is_low(quantity) {
                    low.push(LowStock {
                        outlet_id,
                        policy,
                        quantity,
                    });
                }
            }
        }
        low
    }
}

impl Projection for StockLevels {
    type Ev = StockMovement;

    fn apply(&mut self, envelope: &EventEnvelope<StockMovement>) {
        self.apply_movement(envelope.payload());
    }
}

/// The unit whose stock a threshold is compared against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum StockUnit {
    Product {
        product_id: ProductId,
    },
    Variation {
        product_id: ProductId,
        variation_id: VariationId,
    },
}

impl StockUnit {
    pub fn product_id(&self) -> ProductId {
        match self {
            StockUnit::Product { product_id } | StockUnit::Variation { product_id, .. } => {
                *product_id
            }
        }
    }

    pub fn variation_id(&self) -> Option<VariationId> {
        match self {
            StockUnit::Product { .. } => None,
            StockUnit::Variation { variation_id, .. } => Some(*variation_id),
        }
    }
}

/// Resolved low-stock policy for one stock unit.
///
/// Exactly one set of settings applies to an item: when the product has at
/// least one inventory-tracked variation, stock is tracked per variation and
/// each variation's own settings apply; otherwise the product is the unit and
/// product-level settings apply. Settings are never combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPolicy {
    pub unit: StockUnit,
    pub track_inventory: bool,
    pub low_stock_threshold: i64,
}

impl StockPolicy {
    /// Policy for a product, optionally narrowed to a variation.
    ///
    /// Asking for the product of a variation-tracked product yields a product
    /// unit that is never low: its thresholds live on the variations.
    pub fn resolve(
        product: &CatalogProduct,
        variation_id: Option<VariationId>,
    ) -> DomainResult<Self> {
        let product_id = *product.id();
        let variation = match variation_id {
            Some(v) => Some(
                product
                    .variation(v)
                    .ok_or_else(|| DomainError::not_found(format!("variation {v}")))?,
            ),
            None => None,
        };

        if product.has_tracked_variations() {
            return Ok(match variation {
                Some(v) => Self {
                    unit: StockUnit::Variation {
                        product_id,
                        variation_id: v.variation_id,
                    },
                    track_inventory: v.settings.track_inventory,
                    low_stock_threshold: v.settings.low_stock_threshold,
                },
                None => Self {
                    unit: StockUnit::Product { product_id },
                    track_inventory: false,
                    low_stock_threshold: 0,
                },
            });
        }

        let settings = product.settings();
        Ok(Self {
            unit: StockUnit::Product { product_id },
            track_inventory: settings.track_inventory,
            low_stock_threshold: settings.low_stock_threshold,
        })
    }

    /// Every unit of a product that low stock is evaluated for.
    pub fn units(product: &CatalogProduct) -> Vec<Self> {
        let product_id = *product.id();
        if product.has_tracked_variations() {
            product
                .variations()
                .iter()
                .map(|v| Self {
                    unit: StockUnit::Variation {
                        product_id,
                        variation_id: v.variation_id,
                    },
                    track_inventory: v.settings.track_inventory,
                    low_stock_threshold: v.settings.low_stock_threshold,
                })
                .collect()
        } else {
            let settings = product.settings();
            vec![Self {
                unit: StockUnit::Product { product_id },
                track_inventory: settings.track_inventory,
                low_stock_threshold: settings.low_stock_threshold,
            }]
        }
    }

    /// `track && threshold > 0 && stock <= threshold`.
    pub fn is_low(&self, current_stock: i64) -> bool {
        self.track_inventory
            && self.low_stock_threshold > 0
            && current_stock <= self.low_stock_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
    pub outlet_id: OutletId,
    pub policy: StockPolicy,
    pub quantity: i64,
}
