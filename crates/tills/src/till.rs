use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{
    Aggregate, AggregateRoot, Conflict, DomainError, Money, OutletId, ShiftId, TenantId, TillId,
    UserId,
};
use posledger_events::Event;

use crate::shift::{CashReconciliation, Shift, expected_cash};

pub const MAX_NOTES_LEN: usize = 1_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TillStatus {
    Active,
    Inactive,
    /// Removed from service. Kept so past shifts stay attributable.
    Retired,
}

/// Aggregate root: Till.
///
/// Holds the till registry data and the currently running shift, if any.
/// Completed shifts live in the read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Till {
    id: TillId,
    tenant_id: Option<TenantId>,
    outlet_id: Option<OutletId>,
    name: String,
    status: TillStatus,
    running: Option<Shift>,
    version: u64,
    created: bool,
}

impl Till {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: TillId) -> Self {
        Self {
            id,
            tenant_id: None,
            outlet_id: None,
            name: String::new(),
            status: TillStatus::Active,
            running: None,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn outlet_id(&self) -> Option<OutletId> {
        self.outlet_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TillStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Derived: a till is in use exactly when a shift is running on it.
    pub fn is_in_use(&self) -> bool {
        self.running.is_some()
    }

    pub fn running_shift(&self) -> Option<&Shift> {
        self.running.as_ref()
    }
}

impl AggregateRoot for Till {
    type Id = TillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterTill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTill {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub outlet_id: OutletId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartShift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartShift {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub outlet_id: OutletId,
    pub user_id: UserId,
    pub operating_date: NaiveDate,
    pub opening_cash: Money,
    pub float: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command payload for cash sales and refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCash {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub amount: Money,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseShift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseShift {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub closing_cash: Money,
    pub notes: Option<String>,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TillCommand {
    Register(RegisterTill),
    Rename {
        tenant_id: TenantId,
        till_id: TillId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    Reassign {
        tenant_id: TenantId,
        till_id: TillId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    },
    Deactivate {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    Reactivate {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    Retire {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    StartShift(StartShift),
    RecordCashSale(RecordCash),
    RecordCashRefund(RecordCash),
    CloseShift(CloseShift),
}

impl TillCommand {
    pub fn till_id(&self) -> TillId {
        match self {
            TillCommand::Register(c) => c.till_id,
            TillCommand::Rename { till_id, .. }
            | TillCommand::Reassign { till_id, .. }
            | TillCommand::Deactivate { till_id, .. }
            | TillCommand::Reactivate { till_id, .. }
            | TillCommand::Retire { till_id, .. } => *till_id,
            TillCommand::StartShift(c) => c.till_id,
            TillCommand::RecordCashSale(c) | TillCommand::RecordCashRefund(c) => c.till_id,
            TillCommand::CloseShift(c) => c.till_id,
        }
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            TillCommand::Register(c) => c.tenant_id,
            TillCommand::Rename { tenant_id, .. }
            | TillCommand::Reassign { tenant_id, .. }
            | TillCommand::Deactivate { tenant_id, .. }
            | TillCommand::Reactivate { tenant_id, .. }
            | TillCommand::Retire { tenant_id, .. } => *tenant_id,
            TillCommand::StartShift(c) => c.tenant_id,
            TillCommand::RecordCashSale(c) | TillCommand::RecordCashRefund(c) => c.tenant_id,
            TillCommand::CloseShift(c) => c.tenant_id,
        }
    }
}

/// Event: ShiftStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftStarted {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub outlet_id: OutletId,
    pub user_id: UserId,
    pub operating_date: NaiveDate,
    pub opening_cash: Money,
    pub float: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CashSaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashSaleRecorded {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub amount: Money,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CashRefundRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRefundRecorded {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub amount: Money,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShiftClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftClosed {
    pub tenant_id: TenantId,
    pub till_id: TillId,
    pub shift_id: ShiftId,
    pub reconciliation: CashReconciliation,
    pub notes: Option<String>,
    pub closed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TillEvent {
    TillRegistered {
        tenant_id: TenantId,
        till_id: TillId,
        outlet_id: OutletId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    TillRenamed {
        tenant_id: TenantId,
        till_id: TillId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    TillReassigned {
        tenant_id: TenantId,
        till_id: TillId,
        from_outlet: OutletId,
        to_outlet: OutletId,
        occurred_at: DateTime<Utc>,
    },
    TillDeactivated {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    TillReactivated {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    TillRetired {
        tenant_id: TenantId,
        till_id: TillId,
        occurred_at: DateTime<Utc>,
    },
    ShiftStarted(ShiftStarted),
    CashSaleRecorded(CashSaleRecorded),
    CashRefundRecorded(CashRefundRecorded),
    ShiftClosed(ShiftClosed),
}

impl TillEvent {
    pub fn till_id(&self) -> TillId {
        match self {
            TillEvent::TillRegistered { till_id, .. }
            | TillEvent::TillRenamed { till_id, .. }
            | TillEvent::TillReassigned { till_id, .. }
            | TillEvent::TillDeactivated { till_id, .. }
            | TillEvent::TillReactivated { till_id, .. }
            | TillEvent::TillRetired { till_id, .. } => *till_id,
            TillEvent::ShiftStarted(e) => e.till_id,
            TillEvent::CashSaleRecorded(e) => e.till_id,
            TillEvent::CashRefundRecorded(e) => e.till_id,
            TillEvent::ShiftClosed(e) => e.till_id,
        }
    }

    /// The shift this event belongs to, for shift-level events.
    pub fn shift_id(&self) -> Option<ShiftId> {
        match self {
            TillEvent::ShiftStarted(e) => Some(e.shift_id),
            TillEvent::CashSaleRecorded(e) => Some(e.shift_id),
            TillEvent::CashRefundRecorded(e) => Some(e.shift_id),
            TillEvent::ShiftClosed(e) => Some(e.shift_id),
            _ => None,
        }
    }

    /// Fold a shift-level event into a shift read model.
    pub fn apply_to_shift(&self, shift: &mut Shift) {
        match self {
            TillEvent::CashSaleRecorded(e) => shift.record_sale(e.amount),
            TillEvent::CashRefundRecorded(e) => shift.record_refund(e.amount),
            TillEvent::ShiftClosed(e) => shift.close(e),
            _ => {}
        }
    }
}

impl Event for TillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TillEvent::TillRegistered { .. } => "tills.till.registered",
            TillEvent::TillRenamed { .. } => "tills.till.renamed",
            TillEvent::TillReassigned { .. } => "tills.till.reassigned",
            TillEvent::TillDeactivated { .. } => "tills.till.deactivated",
            TillEvent::TillReactivated { .. } => "tills.till.reactivated",
            TillEvent::TillRetired { .. } => "tills.till.retired",
            TillEvent::ShiftStarted(_) => "tills.shift.started",
            TillEvent::CashSaleRecorded(_) => "tills.shift.cash_sale_recorded",
            TillEvent::CashRefundRecorded(_) => "tills.shift.cash_refund_recorded",
            TillEvent::ShiftClosed(_) => "tills.shift.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TillEvent::TillRegistered { occurred_at, .. }
            | TillEvent::TillRenamed { occurred_at, .. }
            | TillEvent::TillReassigned { occurred_at, .. }
            | TillEvent::TillDeactivated { occurred_at, .. }
            | TillEvent::TillReactivated { occurred_at, .. }
            | TillEvent::TillRetired { occurred_at, .. } => *occurred_at,
            TillEvent::ShiftStarted(e) => e.occurred_at,
            TillEvent::CashSaleRecorded(e) => e.occurred_at,
            TillEvent::CashRefundRecorded(e) => e.occurred_at,
            TillEvent::ShiftClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Till {
    type Command = TillCommand;
    type Event = TillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TillEvent::TillRegistered {
                tenant_id,
                till_id,
                outlet_id,
                name,
                ..
            } => {
                self.id = *till_id;
                self.tenant_id = Some(*tenant_id);
                self.outlet_id = Some(*outlet_id);
                self.name = name.clone();
                self.status = TillStatus::Active;
                self.created = true;
            }
            TillEvent::TillRenamed { name, .. } => self.name = name.clone(),
            TillEvent::TillReassigned { to_outlet, .. } => self.outlet_id = Some(*to_outlet),
            TillEvent::TillDeactivated { .. } => self.status = TillStatus::Inactive,
            TillEvent::TillReactivated { .. } => self.status = TillStatus::Active,
            TillEvent::TillRetired { .. } => self.status = TillStatus::Retired,
            TillEvent::ShiftStarted(e) => self.running = Some(Shift::started(e)),
            TillEvent::CashSaleRecorded(_) | TillEvent::CashRefundRecorded(_) => {
                if let Some(shift) = self.running.as_mut() {
                    event.apply_to_shift(shift);
                }
            }
            TillEvent::ShiftClosed(_) => self.running = None,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let TillCommand::Register(cmd) = command {
            return self.handle_register(cmd);
        }

        self.ensure_exists(command.tenant_id(), command.till_id())?;

        match command {
            TillCommand::Register(_) => Ok(vec![]),
            TillCommand::Rename {
                tenant_id,
                till_id,
                name,
                occurred_at,
            } => {
                let name = validate_name(name)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![TillEvent::TillRenamed {
                    tenant_id: *tenant_id,
                    till_id: *till_id,
                    name,
                    occurred_at: *occurred_at,
                }])
            }
            TillCommand::Reassign {
                tenant_id,
                till_id,
                outlet_id,
                occurred_at,
            } => {
                self.ensure_idle()?;
                let from_outlet = self.current_outlet()?;
                if from_outlet == *outlet_id {
                    return Ok(vec![]);
                }
                Ok(vec![TillEvent::TillReassigned {
                    tenant_id: *tenant_id,
                    till_id: *till_id,
                    from_outlet,
                    to_outlet: *outlet_id,
                    occurred_at: *occurred_at,
                }])
            }
            TillCommand::Deactivate {
                tenant_id,
                till_id,
                occurred_at,
            } => {
                self.ensure_idle()?;
                if self.status == TillStatus::Inactive {
                    return Ok(vec![]);
                }
                Ok(vec![TillEvent::TillDeactivated {
                    tenant_id: *tenant_id,
                    till_id: *till_id,
                    occurred_at: *occurred_at,
                }])
            }
            TillCommand::Reactivate {
                tenant_id,
                till_id,
                occurred_at,
            } => {
                if self.status == TillStatus::Active {
                    return Ok(vec![]);
                }
                Ok(vec![TillEvent::TillReactivated {
                    tenant_id: *tenant_id,
                    till_id: *till_id,
                    occurred_at: *occurred_at,
                }])
            }
            TillCommand::Retire {
                tenant_id,
                till_id,
                occurred_at,
            } => {
                self.ensure_idle()?;
                Ok(vec![TillEvent::TillRetired {
                    tenant_id: *tenant_id,
                    till_id: *till_id,
                    occurred_at: *occurred_at,
                }])
            }
            TillCommand::StartShift(cmd) => self.handle_start(cmd),
            TillCommand::RecordCashSale(cmd) => self.handle_cash(cmd, false),
            TillCommand::RecordCashRefund(cmd) => self.handle_cash(cmd, true),
            TillCommand::CloseShift(cmd) => self.handle_close(cmd),
        }
    }
}

impl Till {
    /// Unknown, foreign-tenant and retired tills all read as "not found".
    fn ensure_exists(&self, tenant_id: TenantId, till_id: TillId) -> Result<(), DomainError> {
        if !self.created
            || self.tenant_id != Some(tenant_id)
            || self.id != till_id
            || self.status == TillStatus::Retired
        {
            return Err(DomainError::not_found(format!("till {till_id}")));
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), DomainError> {
        if self.is_in_use() {
            return Err(Conflict::TillInUse.into());
        }
        Ok(())
    }

    fn current_outlet(&self) -> Result<OutletId, DomainError> {
        self.outlet_id
            .ok_or_else(|| DomainError::not_found(format!("outlet of till {}", self.id)))
    }

    fn running_shift_for(&self, shift_id: ShiftId) -> Result<&Shift, DomainError> {
        match &self.running {
            Some(shift) if shift.shift_id == shift_id => Ok(shift),
            _ => Err(Conflict::ShiftNotRunning.into()),
        }
    }

    fn handle_register(&self, cmd: &RegisterTill) -> Result<Vec<TillEvent>, DomainError> {
        if self.created {
            return Err(Conflict::AlreadyExists(format!("till {}", cmd.till_id)).into());
        }
        let name = validate_name(&cmd.name)?;
        Ok(vec![TillEvent::TillRegistered {
            tenant_id: cmd.tenant_id,
            till_id: cmd.till_id,
            outlet_id: cmd.outlet_id,
            name,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_start(&self, cmd: &StartShift) -> Result<Vec<TillEvent>, DomainError> {
        self.ensure_idle()?;
        if self.status == TillStatus::Inactive {
            return Err(Conflict::TillInactive.into());
        }
        if self.outlet_id != Some(cmd.outlet_id) {
            return Err(DomainError::validation(format!(
                "till {} does not belong to outlet {}",
                self.id, cmd.outlet_id
            )));
        }
        if cmd.operating_date > cmd.occurred_at.date_naive() {
            return Err(DomainError::validation(format!(
                "operating date {} is in the future",
                cmd.operating_date
            )));
        }
        if cmd.opening_cash.is_negative() || cmd.float.is_negative() {
            return Err(DomainError::validation(
                "opening cash and float cannot be negative",
            ));
        }
        if cmd.opening_cash.checked_add(cmd.float).is_none() {
            return Err(DomainError::validation("opening cash and float overflow"));
        }

        Ok(vec![TillEvent::ShiftStarted(ShiftStarted {
            tenant_id: cmd.tenant_id,
            till_id: cmd.till_id,
            shift_id: cmd.shift_id,
            outlet_id: cmd.outlet_id,
            user_id: cmd.user_id,
            operating_date: cmd.operating_date,
            opening_cash: cmd.opening_cash,
            float: cmd.float,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cash(&self, cmd: &RecordCash, refund: bool) -> Result<Vec<TillEvent>, DomainError> {
        let shift = self.running_shift_for(cmd.shift_id)?;
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("cash amount must be positive"));
        }

        let (sales, refunds) = if refund {
            (Some(shift.cash_sales), shift.cash_refunds.checked_add(cmd.amount))
        } else {
            (shift.cash_sales.checked_add(cmd.amount), Some(shift.cash_refunds))
        };
        let within_range = match (sales, refunds) {
            (Some(s), Some(r)) => expected_cash(shift.opening_cash, shift.float, s, r).is_some(),
            _ => false,
        };
        if !within_range {
            return Err(DomainError::validation("cash totals overflow"));
        }

        Ok(vec![if refund {
            TillEvent::CashRefundRecorded(CashRefundRecorded {
                tenant_id: cmd.tenant_id,
                till_id: cmd.till_id,
                shift_id: cmd.shift_id,
                amount: cmd.amount,
                user_id: cmd.user_id,
                occurred_at: cmd.occurred_at,
            })
        } else {
            TillEvent::CashSaleRecorded(CashSaleRecorded {
                tenant_id: cmd.tenant_id,
                till_id: cmd.till_id,
                shift_id: cmd.shift_id,
                amount: cmd.amount,
                user_id: cmd.user_id,
                occurred_at: cmd.occurred_at,
            })
        }])
    }

    fn handle_close(&self, cmd: &CloseShift) -> Result<Vec<TillEvent>, DomainError> {
        let shift = self.running_shift_for(cmd.shift_id)?;
        if cmd.closing_cash.is_negative() {
            return Err(DomainError::validation("closing cash cannot be negative"));
        }
        let notes = cmd
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(DomainError::validation(format!(
                "notes longer than {MAX_NOTES_LEN} characters"
            )));
        }

        let reconciliation = CashReconciliation::compute(
            shift.opening_cash,
            shift.float,
            shift.cash_sales,
            shift.cash_refunds,
            cmd.closing_cash,
        )
        .ok_or_else(|| DomainError::validation("cash totals overflow"))?;

        Ok(vec![TillEvent::ShiftClosed(ShiftClosed {
            tenant_id: cmd.tenant_id,
            till_id: cmd.till_id,
            shift_id: cmd.shift_id,
            reconciliation,
            notes,
            closed_by: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("till name cannot be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        tenant: TenantId,
        outlet: OutletId,
        till: Till,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let tenant = TenantId::new();
            let outlet = OutletId::new();
            let till_id = TillId::new();
            let mut f = Self {
                tenant,
                outlet,
                till: Till::empty(till_id),
                now: Utc.with_ymd_and_hms(2026, 5, 2, 8, 30, 0).unwrap(),
            };
            f.run(TillCommand::Register(RegisterTill {
                tenant_id: tenant,
                till_id,
                outlet_id: outlet,
                name: "Till 7".into(),
                occurred_at: f.now,
            }))
            .unwrap();
            f
        }

        fn till_id(&self) -> TillId {
            *self.till.id()
        }

        fn run(&mut self, cmd: TillCommand) -> Result<Vec<TillEvent>, DomainError> {
            let events = self.till.handle(&cmd)?;
            for e in &events {
                self.till.apply(e);
            }
            Ok(events)
        }

        fn start_cmd(&self, opening: i64, float: i64) -> TillCommand {
            TillCommand::StartShift(StartShift {
                tenant_id: self.tenant,
                till_id: self.till_id(),
                shift_id: ShiftId::new(),
                outlet_id: self.outlet,
                user_id: UserId::new(),
                operating_date: self.now.date_naive(),
                opening_cash: Money::from_major(opening),
                float: Money::from_major(float),
                occurred_at: self.now,
            })
        }

        fn start(&mut self, opening: i64, float: i64) -> ShiftId {
            let cmd = self.start_cmd(opening, float);
            match &self.run(cmd).unwrap()[0] {
                TillEvent::ShiftStarted(e) => e.shift_id,
                other => panic!("unexpected event {other:?}"),
            }
        }

        fn cash(&self, shift_id: ShiftId, major: i64) -> RecordCash {
            RecordCash {
                tenant_id: self.tenant,
                till_id: self.till_id(),
                shift_id,
                amount: Money::from_major(major),
                user_id: UserId::new(),
                occurred_at: self.now,
            }
        }

        fn close_cmd(&self, shift_id: ShiftId, counted: i64) -> TillCommand {
            TillCommand::CloseShift(CloseShift {
                tenant_id: self.tenant,
                till_id: self.till_id(),
                shift_id,
                closing_cash: Money::from_major(counted),
                notes: Some("  ".into()),
                user_id: UserId::new(),
                occurred_at: self.now + Duration::hours(8),
            })
        }
    }

    fn conflict(err: DomainError) -> Conflict {
        match err {
            DomainError::Conflict(c) => c,
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn second_start_on_busy_till_is_till_in_use() {
        let mut f = Fixture::new();
        f.start(100, 0);
        assert!(f.till.is_in_use());

        let err = f.run(f.start_cmd(50, 0)).unwrap_err();
        assert_eq!(conflict(err), Conflict::TillInUse);
    }

    #[test]
    fn close_reconciles_cash_and_releases_till() {
        let mut f = Fixture::new();
        let shift = f.start(100, 0);
        f.run(TillCommand::RecordCashSale(f.cash(shift, 250))).unwrap();
        f.run(TillCommand::RecordCashRefund(f.cash(shift, 20))).unwrap();

        let events = f.run(f.close_cmd(shift, 335)).unwrap();
        let TillEvent::ShiftClosed(closed) = &events[0] else {
            panic!("expected ShiftClosed");
        };
        assert_eq!(closed.reconciliation.expected, Money::from_major(330));
        assert_eq!(closed.reconciliation.variance, Money::from_major(5));
        assert_eq!(closed.notes, None);
        assert!(!f.till.is_in_use());

        // Completed is terminal.
        let err = f.run(f.close_cmd(shift, 335)).unwrap_err();
        assert_eq!(conflict(err), Conflict::ShiftNotRunning);
        let err = f.run(TillCommand::RecordCashSale(f.cash(shift, 1))).unwrap_err();
        assert_eq!(conflict(err), Conflict::ShiftNotRunning);

        // The till can be used again.
        f.start(10, 0);
    }

    #[test]
    fn future_operating_date_is_rejected() {
        let mut f = Fixture::new();
        let TillCommand::StartShift(mut cmd) = f.start_cmd(0, 0) else {
            unreachable!()
        };
        cmd.operating_date = f.now.date_naive() + Duration::days(1);
        let err = f.run(TillCommand::StartShift(cmd.clone())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        cmd.operating_date = f.now.date_naive() - Duration::days(1);
        assert!(f.run(TillCommand::StartShift(cmd)).is_ok());
    }

    #[test]
    fn start_requires_matching_outlet_and_non_negative_cash() {
        let mut f = Fixture::new();
        let TillCommand::StartShift(mut cmd) = f.start_cmd(0, 0) else {
            unreachable!()
        };
        cmd.outlet_id = OutletId::new();
        assert!(matches!(
            f.run(TillCommand::StartShift(cmd.clone())).unwrap_err(),
            DomainError::Validation(_)
        ));

        cmd.outlet_id = f.outlet;
        cmd.float = Money::from_minor(-1);
        assert!(matches!(
            f.run(TillCommand::StartShift(cmd)).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn busy_till_cannot_be_deactivated_reassigned_or_retired() {
        let mut f = Fixture::new();
        f.start(0, 0);
        let (tenant_id, till_id, occurred_at) = (f.tenant, f.till_id(), f.now);

        for cmd in [
            TillCommand::Deactivate { tenant_id, till_id, occurred_at },
            TillCommand::Reassign { tenant_id, till_id, outlet_id: OutletId::new(), occurred_at },
            TillCommand::Retire { tenant_id, till_id, occurred_at },
        ] {
            assert_eq!(conflict(f.run(cmd).unwrap_err()), Conflict::TillInUse);
        }
    }

    #[test]
    fn inactive_till_cannot_start_and_retired_till_is_gone() {
        let mut f = Fixture::new();
        let (tenant_id, till_id, occurred_at) = (f.tenant, f.till_id(), f.now);

        f.run(TillCommand::Deactivate { tenant_id, till_id, occurred_at }).unwrap();
        assert_eq!(conflict(f.run(f.start_cmd(0, 0)).unwrap_err()), Conflict::TillInactive);

        f.run(TillCommand::Retire { tenant_id, till_id, occurred_at }).unwrap();
        assert!(matches!(
            f.run(f.start_cmd(0, 0)).unwrap_err(),
            DomainError::NotFound(_)
        ));
    }

    #[test]
    fn cash_against_other_shift_is_rejected() {
        let mut f = Fixture::new();
        f.start(0, 0);
        let err = f
            .run(TillCommand::RecordCashSale(f.cash(ShiftId::new(), 5)))
            .unwrap_err();
        assert_eq!(conflict(err), Conflict::ShiftNotRunning);
    }

    #[test]
    fn foreign_tenant_cannot_see_till() {
        let mut f = Fixture::new();
        let TillCommand::StartShift(mut cmd) = f.start_cmd(0, 0) else {
            unreachable!()
        };
        cmd.tenant_id = TenantId::new();
        assert!(matches!(
            f.run(TillCommand::StartShift(cmd)).unwrap_err(),
            DomainError::NotFound(_)
        ));
    }
}
