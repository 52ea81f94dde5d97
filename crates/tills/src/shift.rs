//! Shift state and cash reconciliation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{Money, OutletId, ShiftId, TenantId, TillId, UserId};
use posledger_events::TenantScoped;

use crate::till::{ShiftClosed, ShiftStarted};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Running,
    Completed,
}

impl core::str::FromStr for ShiftStatus {
    type Err = posledger_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ShiftStatus::Running),
            "completed" => Ok(ShiftStatus::Completed),
            other => Err(posledger_core::DomainError::validation(format!(
                "unknown shift status: {other}"
            ))),
        }
    }
}

/// Cash drawer figures at close.
///
/// `expected = opening + float + cash sales - cash refunds` and
/// `variance = counted - expected`. A positive variance means the drawer is
/// over, a negative one that it is short. Both are recorded verbatim.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashReconciliation {
    pub opening_cash: Money,
    pub float: Money,
    pub cash_sales: Money,
    pub cash_refunds: Money,
    pub expected: Money,
    pub counted: Money,
    pub variance: Money,
}

impl CashReconciliation {
    /// Returns `None` on arithmetic overflow.
    pub fn compute(
        opening_cash: Money,
        float: Money,
        cash_sales: Money,
        cash_refunds: Money,
        counted: Money,
    ) -> Option<Self> {
        let expected = expected_cash(opening_cash, float, cash_sales, cash_refunds)?;
        let variance = counted.checked_sub(expected)?;
        Some(Self {
            opening_cash,
            float,
            cash_sales,
            cash_refunds,
            expected,
            counted,
            variance,
        })
    }
}

pub(crate) fn expected_cash(
    opening_cash: Money,
    float: Money,
    cash_sales: Money,
    cash_refunds: Money,
) -> Option<Money> {
    opening_cash
        .checked_add(float)?
        .checked_add(cash_sales)?
        .checked_sub(cash_refunds)
}

/// A shift on a till, as folded from the till's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub shift_id: ShiftId,
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub outlet_id: OutletId,
    pub user_id: UserId,
    pub operating_date: NaiveDate,
    pub opening_cash: Money,
    pub float: Money,
    pub cash_sales: Money,
    pub cash_refunds: Money,
    pub sale_count: u32,
    pub refund_count: u32,
    pub status: ShiftStatus,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub reconciliation: Option<CashReconciliation>,
    pub notes: Option<String>,
}

impl Shift {
    pub fn started(e: &ShiftStarted) -> Self {
        Self {
            shift_id: e.shift_id,
            tenant_id: e.tenant_id,
            till_id: e.till_id,
            outlet_id: e.outlet_id,
            user_id: e.user_id,
            operating_date: e.operating_date,
            opening_cash: e.opening_cash,
            float: e.float,
            cash_sales: Money::ZERO,
            cash_refunds: Money::ZERO,
            sale_count: 0,
            refund_count: 0,
            status: ShiftStatus::Running,
            started_at: e.occurred_at,
            closed_at: None,
            closed_by: None,
            reconciliation: None,
            notes: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ShiftStatus::Running
    }

    /// Expected drawer cash as of now (the close-time figure once completed).
    pub fn expected_cash(&self) -> Option<Money> {
        match &self.reconciliation {
            Some(r) => Some(r.expected),
            None => expected_cash(self.opening_cash, self.float, self.cash_sales, self.cash_refunds),
        }
    }

    pub(crate) fn record_sale(&mut self, amount: Money) {
        self.cash_sales += amount;
        self.sale_count += 1;
    }

    pub(crate) fn record_refund(&mut self, amount: Money) {
        self.cash_refunds += amount;
        self.refund_count += 1;
    }

    pub(crate) fn close(&mut self, e: &ShiftClosed) {
        self.status = ShiftStatus::Completed;
        self.closed_at = Some(e.occurred_at);
        self.closed_by = Some(e.closed_by);
        self.reconciliation = Some(e.reconciliation);
        self.notes = e.notes.clone();
    }

    /// Summary handed to reporting once the shift is completed.
    pub fn summary(&self) -> Option<ShiftSummary> {
        let (closed_at, cash) = (self.closed_at?, self.reconciliation?);
        Some(ShiftSummary {
            tenant_id: self.tenant_id,
            shift_id: self.shift_id,
            till_id: self.till_id,
            outlet_id: self.outlet_id,
            opened_by: self.user_id,
            closed_by: self.closed_by.unwrap_or(self.user_id),
            operating_date: self.operating_date,
            started_at: self.started_at,
            closed_at,
            sale_count: self.sale_count,
            refund_count: self.refund_count,
            cash,
            notes: self.notes.clone(),
        })
    }
}

/// Published on the bus when a shift closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub tenant_id: TenantId,
    pub shift_id: ShiftId,
    pub till_id: TillId,
    pub outlet_id: OutletId,
    pub opened_by: UserId,
    pub closed_by: UserId,
    pub operating_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub sale_count: u32,
    pub refund_count: u32,
    pub cash: CashReconciliation,
    pub notes: Option<String>,
}

impl TenantScoped for ShiftSummary {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
