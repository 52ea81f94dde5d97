//! Stock movement ledger records.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{
    DomainError, DomainResult, Money, MovementId, OutletId, ProductId, SupplierId, TenantId, UserId,
    VariationId,
};
use posledger_events::{Event, EventEnvelope};

pub const MAX_REFERENCE_LEN: usize = 128;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Stream type used when a movement travels inside an `EventEnvelope`.
pub const STREAM_TYPE: &str = "stock.movement";

/// Kind of inventory-affecting event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Sale,
    Purchase,
    Return,
    Adjustment,
    TransferOut,
    TransferIn,
}

/// Sign a quantity must carry for a given movement type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QuantitySign {
    Negative,
    Positive,
    Either,
}

impl QuantitySign {
    pub fn admits(self, quantity: i64) -> bool {
        match self {
            QuantitySign::Negative => quantity < 0,
            QuantitySign::Positive => quantity > 0,
            QuantitySign::Either => quantity != 0,
        }
    }
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::Sale,
        MovementType::Purchase,
        MovementType::Return,
        MovementType::Adjustment,
        MovementType::TransferOut,
        MovementType::TransferIn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::Purchase => "purchase",
            MovementType::Return => "return",
            MovementType::Adjustment => "adjustment",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
        }
    }

    pub fn sign(self) -> QuantitySign {
        match self {
            MovementType::Sale | MovementType::TransferOut => QuantitySign::Negative,
            MovementType::Purchase | MovementType::Return | MovementType::TransferIn => {
                QuantitySign::Positive
            }
            MovementType::Adjustment => QuantitySign::Either,
        }
    }

    pub fn is_transfer(self) -> bool {
        matches!(self, MovementType::TransferOut | MovementType::TransferIn)
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type: {s}")))
    }
}

/// A movement as submitted by a caller, before the ledger assigns identity
/// and position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub outlet_id: OutletId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub reference_id: Option<String>,
    /// Destination outlet of a `transfer_out`, or source outlet of a `transfer_in`.
    pub counterpart_outlet_id: Option<OutletId>,
    pub supplier_id: Option<SupplierId>,
    pub reason: Option<String>,
    pub actor: UserId,
    /// `None` takes the time the ledger records the movement.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewMovement {
    /// Trim free-text fields; blank strings become `None`. Timestamps are cut
    /// to the microsecond precision the ledger stores.
    pub fn normalized(mut self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        self.reference_id = clean(self.reference_id);
        self.reason = clean(self.reason);
        self.occurred_at = self.occurred_at.map(ledger_precision);
        self
    }

    /// Structural validation. Reference checks (does the outlet exist?) happen
    /// in the engine.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        if !self.movement_type.sign().admits(self.quantity) {
            let expected = match self.movement_type.sign() {
                QuantitySign::Negative => "negative",
                QuantitySign::Positive => "positive",
                QuantitySign::Either => "non-zero",
            };
            return Err(DomainError::validation(format!(
                "{} quantity must be {expected}, got {}",
                self.movement_type, self.quantity
            )));
        }
        if let Some(cost) = self.unit_cost {
            if cost.is_negative() {
                return Err(DomainError::validation("unit_cost cannot be negative"));
            }
        }
        if let Some(reference) = &self.reference_id {
            if reference.len() > MAX_REFERENCE_LEN {
                return Err(DomainError::validation(format!(
                    "reference_id longer than {MAX_REFERENCE_LEN} characters"
                )));
            }
        }
        if let Some(reason) = &self.reason {
            if reason.len() > MAX_REASON_LEN {
                return Err(DomainError::validation(format!(
                    "reason longer than {MAX_REASON_LEN} characters"
                )));
            }
        }
        if let Some(counterpart) = self.counterpart_outlet_id {
            if !self.movement_type.is_transfer() {
                return Err(DomainError::validation(
                    "counterpart_outlet_id is only valid on transfers",
                ));
            }
            if counterpart == self.outlet_id {
                return Err(DomainError::validation(
                    "a transfer cannot name its own outlet as counterpart",
                ));
            }
        }
        Ok(())
    }
}

/// Truncate to microseconds, the resolution of a Postgres `TIMESTAMPTZ`.
pub fn ledger_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Validate a caller-supplied idempotency key.
pub fn validate_idempotency_key(key: &str) -> DomainResult<()> {
    if key.trim().is_empty() {
        return Err(DomainError::validation("idempotency key cannot be blank"));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(DomainError::validation(format!(
            "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// Immutable ledger record.
///
/// Never updated or deleted; corrections are compensating movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: MovementId,
    pub tenant_id: TenantId,
    /// Position in the ledger (monotonic per store, starting at 1).
    pub position: u64,
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
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl StockMovement {
    /// Stamp a validated `NewMovement` with ledger-assigned fields. A movement
    /// without `occurred_at` happened when it was recorded.
    pub fn record(
        tenant_id: TenantId,
        movement_id: MovementId,
        position: u64,
        recorded_at: DateTime<Utc>,
        idempotency_key: Option<String>,
        new: NewMovement,
    ) -> Self {
        Self {
            movement_id,
            tenant_id,
            position,
            outlet_id: new.outlet_id,
            product_id: new.product_id,
            variation_id: new.variation_id,
            movement_type: new.movement_type,
            quantity: new.quantity,
            unit_cost: new.unit_cost,
            reference_id: new.reference_id,
            counterpart_outlet_id: new.counterpart_outlet_id,
            supplier_id: new.supplier_id,
            reason: new.reason,
            actor: new.actor,
            occurred_at: new.occurred_at.unwrap_or(recorded_at),
            recorded_at,
            idempotency_key,
        }
    }

    /// Whether `new` describes the same movement (used to tell an idempotent
    /// retry from a reused key). A retry that leaves `occurred_at` unset
    /// matches whatever time the first attempt was stamped with.
    pub fn same_content(&self, new: &NewMovement) -> bool {
        self.outlet_id == new.outlet_id
            && self.product_id == new.product_id
            && self.variation_id == new.variation_id
            && self.movement_type == new.movement_type
            && self.quantity == new.quantity
            && self.unit_cost == new.unit_cost
            && self.reference_id == new.reference_id
            && self.counterpart_outlet_id == new.counterpart_outlet_id
            && self.supplier_id == new.supplier_id
            && self.reason == new.reason
            && new.occurred_at.is_none_or(|at| at == self.occurred_at)
    }

    /// Absolute quantity moved (transfers are matched on this).
    pub fn magnitude(&self) -> u64 {
        self.quantity.unsigned_abs()
    }

    /// Wrap into an envelope; the ledger position is the sequence number.
    pub fn to_envelope(&self) -> EventEnvelope<StockMovement> {
        EventEnvelope::new(
            *self.movement_id.as_uuid(),
            self.tenant_id,
            self.outlet_id.as_aggregate(),
            STREAM_TYPE,
            self.position,
            self.recorded_at,
            self.clone(),
        )
    }
}

impl Event for StockMovement {
    fn event_type(&self) -> &'static str {
        match self.movement_type {
            MovementType::Sale => "inventory.movement.sale",
            MovementType::Purchase => "inventory.movement.purchase",
            MovementType::Return => "inventory.movement.return",
            MovementType::Adjustment => "inventory.movement.adjustment",
            MovementType::TransferOut => "inventory.movement.transfer_out",
            MovementType::TransferIn => "inventory.movement.transfer_in",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
