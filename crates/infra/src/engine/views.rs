//! Read-side shapes returned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{AggregateRoot, OutletId, ProductId, ShiftId, SupplierId, TillId, VariationId};
use posledger_inventory::{
    CatalogProduct, LowStock, Outlet, StockBalance, StockMovement, StockPolicy, StockSettings,
    Supplier, TypeTotals, Variation,
};
use posledger_tills::{Till, TillStatus};

use crate::ledger::Pagination;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletView {
    pub outlet_id: OutletId,
    pub name: String,
    pub active: bool,
}

impl From<&Outlet> for OutletView {
    fn from(o: &Outlet) -> Self {
        Self {
            outlet_id: *o.id(),
            name: o.name().to_string(),
            active: o.is_active(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub settings: StockSettings,
    /// Whether low stock is evaluated per variation.
    pub tracked_per_variation: bool,
    pub variations: Vec<Variation>,
}

impl From<&CatalogProduct> for ProductView {
    fn from(p: &CatalogProduct) -> Self {
        Self {
            product_id: *p.id(),
            name: p.name().to_string(),
            sku: p.sku().map(str::to_string),
            settings: p.settings(),
            tracked_per_variation: p.has_tracked_variations(),
            variations: p.variations().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierView {
    pub supplier_id: SupplierId,
    pub name: String,
    pub references: Vec<String>,
}

impl From<&Supplier> for SupplierView {
    fn from(s: &Supplier) -> Self {
        Self {
            supplier_id: *s.id(),
            name: s.name().to_string(),
            references: s.references().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TillView {
    pub till_id: TillId,
    pub outlet_id: OutletId,
    pub name: String,
    pub status: TillStatus,
    pub in_use: bool,
    pub running_shift_id: Option<ShiftId>,
}

impl TillView {
    pub fn of(till: &Till) -> Option<Self> {
        Some(Self {
            till_id: *till.id(),
            outlet_id: till.outlet_id()?,
            name: till.name().to_string(),
            status: till.status(),
            in_use: till.is_in_use(),
            running_shift_id: till.running_shift().map(|s| s.shift_id),
        })
    }
}

/// Stock of one unit at one outlet, with the low-stock verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    pub outlet_id: OutletId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub negative_stock: bool,
    pub track_inventory: bool,
    pub low_stock_threshold: i64,
    pub is_low: bool,
    pub movement_count: u64,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub totals_by_type: TypeTotals,
    /// Last ledger position folded into this answer.
    pub watermark: u64,
}

impl StockView {
    pub fn new(outlet_id: OutletId, policy: StockPolicy, balance: StockBalance, watermark: u64) -> Self {
        Self {
            outlet_id,
            product_id: policy.unit.product_id(),
            variation_id: policy.unit.variation_id(),
            quantity: balance.quantity,
            negative_stock: balance.is_negative(),
            track_inventory: policy.track_inventory,
            low_stock_threshold: policy.low_stock_threshold,
            is_low: policy.is_low(balance.quantity),
            movement_count: balance.movement_count,
            last_movement_at: balance.last_movement_at,
            totals_by_type: balance.totals_by_type,
            watermark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub outlet_id: OutletId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub low_stock_threshold: i64,
}

impl LowStockItem {
    pub fn new(low: &LowStock, product_name: &str) -> Self {
        Self {
            outlet_id: low.outlet_id,
            product_id: low.policy.unit.product_id(),
            product_name: product_name.to_string(),
            variation_id: low.policy.unit.variation_id(),
            quantity: low.quantity,
            low_stock_threshold: low.policy.low_stock_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockReport {
    pub items: Vec<LowStockItem>,
    pub watermark: u64,
}

/// A ledger row with late supplier attribution joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub movement: StockMovement,
    /// `supplier_id` from the row, else the supplier its reference was attributed to.
    pub attributed_supplier_id: Option<SupplierId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Result of rebuilding a tenant's read models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub stock_watermark: u64,
    pub outlets: usize,
    pub products: usize,
    pub suppliers: usize,
    pub tills: usize,
    pub shifts: usize,
}
