use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use posledger_core::{Money, OutletId, ProductId, ShiftId, SupplierId, TillId, UserId, VariationId};
use posledger_infra::ledger::MovementFilter;
use posledger_inventory::{MovementType, NewMovement, StockSettings};
use posledger_tills::ShiftStatus;

use axum::http::StatusCode;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------
//
// Money amounts are integers in minor currency units.

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub outlet_id: OutletId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub reference_id: Option<String>,
    pub counterpart_outlet_id: Option<OutletId>,
    pub supplier_id: Option<SupplierId>,
    pub reason: Option<String>,
    /// Defaults to the time the ledger records the movement.
    pub occurred_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

impl RecordMovementRequest {
    /// Split into the movement and the idempotency key carried in the body.
    pub fn into_movement(self, actor: UserId) -> (NewMovement, Option<String>) {
        let movement = NewMovement {
            outlet_id: self.outlet_id,
            product_id: self.product_id,
            variation_id: self.variation_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            reference_id: self.reference_id,
            counterpart_outlet_id: self.counterpart_outlet_id,
            supplier_id: self.supplier_id,
            reason: self.reason,
            actor,
            occurred_at: self.occurred_at,
        };
        (movement, self.idempotency_key)
    }
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub settings: StockSettings,
}

#[derive(Debug, Deserialize)]
pub struct AddVariationRequest {
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub settings: StockSettings,
}

/// Settings for the product itself, or for one variation when `variation_id` is set.
#[derive(Debug, Deserialize)]
pub struct StockSettingsRequest {
    pub variation_id: Option<VariationId>,
    pub track_inventory: bool,
    pub low_stock_threshold: i64,
}

impl StockSettingsRequest {
    pub fn settings(&self) -> StockSettings {
        StockSettings {
            track_inventory: self.track_inventory,
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttributionRequest {
    pub reference_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterTillRequest {
    pub outlet_id: OutletId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReassignTillRequest {
    pub outlet_id: OutletId,
}

#[derive(Debug, Deserialize)]
pub struct StartShiftRequest {
    pub till_id: TillId,
    pub outlet_id: OutletId,
    /// Defaults to today (UTC).
    pub operating_date: Option<NaiveDate>,
    pub opening_cash: Money,
    #[serde(default)]
    pub float: Money,
}

#[derive(Debug, Deserialize)]
pub struct CloseShiftRequest {
    pub shift_id: ShiftId,
    pub closing_cash: Money,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CashRequest {
    pub amount: Money,
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct MovementsQuery {
    pub outlet: Option<String>,
    pub product: Option<String>,
    pub variation: Option<String>,
    /// One type or a comma-separated list.
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub reference_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MovementsQuery {
    pub fn filter(&self) -> Result<MovementFilter, axum::response::Response> {
        let movement_types = match self.movement_type.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| {
                    t.parse::<MovementType>().map_err(|e| {
                        errors::json_error(StatusCode::BAD_REQUEST, "invalid_type", e.to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(MovementFilter {
            outlet_id: parse_opt_id(self.outlet.as_deref(), "outlet")?,
            product_id: parse_opt_id(self.product.as_deref(), "product")?,
            variation_id: parse_opt_id(self.variation.as_deref(), "variation")?,
            movement_types,
            reference_id: self.reference_id.clone(),
            occurred_from: self.from,
            occurred_to: self.to,
            after_position: None,
            newest_first: true,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub outlet: Option<String>,
    pub product: Option<String>,
    pub variation: Option<String>,
}

impl StockQuery {
    pub fn ids(
        &self,
    ) -> Result<(OutletId, ProductId, Option<VariationId>), axum::response::Response> {
        Ok((
            require_id(self.outlet.as_deref(), "outlet")?,
            require_id(self.product.as_deref(), "product")?,
            parse_opt_id(self.variation.as_deref(), "variation")?,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OutletQuery {
    pub outlet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub outlet: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShiftsQuery {
    pub outlet: Option<String>,
    pub status: Option<String>,
}

impl ShiftsQuery {
    pub fn status(&self) -> Result<Option<ShiftStatus>, axum::response::Response> {
        self.status
            .as_deref()
            .map(|s| {
                s.parse::<ShiftStatus>().map_err(|e| {
                    errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string())
                })
            })
            .transpose()
    }
}

// -------------------------
// Id parsing
// -------------------------

pub fn parse_id<T: core::str::FromStr>(
    raw: &str,
    field: &'static str,
) -> Result<T, axum::response::Response> {
    raw.trim().parse::<T>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{field} must be a UUID"),
        )
    })
}

pub fn parse_opt_id<T: core::str::FromStr>(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<T>, axum::response::Response> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| parse_id(r, field))
        .transpose()
}

pub fn require_id<T: core::str::FromStr>(
    raw: Option<&str>,
    field: &'static str,
) -> Result<T, axum::response::Response> {
    parse_opt_id(raw, field)?.ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_parameter",
            format!("{field} is required"),
        )
    })
}
