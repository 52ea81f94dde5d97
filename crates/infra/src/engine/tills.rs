//! Till registry and shift lifecycle.

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use posledger_core::{Money, OutletId, ShiftId, TillId, UserId};
use posledger_events::EventBus;
use posledger_tills::{
    CloseShift, RecordCash, RegisterTill, Shift, ShiftStatus, StartShift, Till, TillCommand,
    TillStatus,
};

use crate::command_dispatcher::Dispatched;
use crate::error::{EngineError, EngineResult};

use super::views::TillView;
use super::{TenantScope, TILL_STREAM};

impl TenantScope<'_> {
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, outlet_id = %outlet_id))]
    pub fn register_till(&self, outlet_id: OutletId, name: &str) -> EngineResult<TillView> {
        self.active_outlet(outlet_id)?;
        let till_id = TillId::new();
        let command = TillCommand::Register(RegisterTill {
            tenant_id: self.tenant_id,
            till_id,
            outlet_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        });
        let done = self.till_command(till_id, &command)?;
        info!(till_id = %till_id, "till registered");
        view(&done.aggregate)
    }

    pub fn rename_till(&self, till_id: TillId, name: &str) -> EngineResult<TillView> {
        let command = TillCommand::Rename {
            tenant_id: self.tenant_id,
            till_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        };
        view(&self.till_command(till_id, &command)?.aggregate)
    }

    /// Move an idle till to another active outlet.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, till_id = %till_id))]
    pub fn reassign_till(&self, till_id: TillId, outlet_id: OutletId) -> EngineResult<TillView> {
        self.active_outlet(outlet_id)?;
        let command = TillCommand::Reassign {
            tenant_id: self.tenant_id,
            till_id,
            outlet_id,
            occurred_at: Utc::now(),
        };
        view(&self.till_command(till_id, &command)?.aggregate)
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, till_id = %till_id))]
    pub fn deactivate_till(&self, till_id: TillId) -> EngineResult<TillView> {
        let command = TillCommand::Deactivate {
            tenant_id: self.tenant_id,
            till_id,
            occurred_at: Utc::now(),
        };
        view(&self.till_command(till_id, &command)?.aggregate)
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, till_id = %till_id))]
    pub fn reactivate_till(&self, till_id: TillId) -> EngineResult<TillView> {
        let command = TillCommand::Reactivate {
            tenant_id: self.tenant_id,
            till_id,
            occurred_at: Utc::now(),
        };
        view(&self.till_command(till_id, &command)?.aggregate)
    }

    /// Retire ("delete") an idle till. It disappears from every listing.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, till_id = %till_id))]
    pub fn retire_till(&self, till_id: TillId) -> EngineResult<()> {
        let command = TillCommand::Retire {
            tenant_id: self.tenant_id,
            till_id,
            occurred_at: Utc::now(),
        };
        self.till_command(till_id, &command)?;
        info!("till retired");
        Ok(())
    }

    pub fn till(&self, till_id: TillId) -> EngineResult<TillView> {
        self.engine
            .tills
            .get(self.tenant_id, &till_id)
            .filter(|t| t.status() != TillStatus::Retired)
            .and_then(|t| TillView::of(&t))
            .ok_or_else(|| EngineError::not_found(format!("till {till_id}")))
    }

    /// Tills with their in-use flag, optionally for one outlet. Retired tills are left out.
    pub fn tills(&self, outlet_id: Option<OutletId>) -> Vec<TillView> {
        let mut tills: Vec<_> = self
            .engine
            .tills
            .list(self.tenant_id)
            .iter()
            .filter(|t| t.status() != TillStatus::Retired)
            .filter_map(TillView::of)
            .filter(|t| outlet_id.is_none_or(|o| t.outlet_id == o))
            .collect();
        tills.sort_by(|a, b| a.name.cmp(&b.name));
        tills
    }

    /// Open a shift on a till.
    ///
    /// The decision is appended at the till stream version it was made
    /// against. Of two concurrent starts one commits; the other reloads,
    /// sees the running shift and fails with `TillInUse`.
    #[instrument(
        skip(self, opening_cash, float),
        fields(tenant_id = %self.tenant_id, till_id = %till_id, outlet_id = %outlet_id)
    )]
    pub fn start_shift(
        &self,
        till_id: TillId,
        outlet_id: OutletId,
        user_id: UserId,
        operating_date: NaiveDate,
        opening_cash: Money,
        float: Money,
    ) -> EngineResult<Shift> {
        self.active_outlet(outlet_id)?;
        let shift_id = ShiftId::new();
        let command = TillCommand::StartShift(StartShift {
            tenant_id: self.tenant_id,
            till_id,
            shift_id,
            outlet_id,
            user_id,
            operating_date,
            opening_cash,
            float,
            occurred_at: Utc::now(),
        });
        let done = self.till_command(till_id, &command)?;
        let shift = done
            .aggregate
            .running_shift()
            .cloned()
            .ok_or_else(|| EngineError::Transient(format!("shift {shift_id} missing after start")))?;
        info!(shift_id = %shift_id, %operating_date, "shift started");
        Ok(shift)
    }

    pub fn record_cash_sale(
        &self,
        shift_id: ShiftId,
        amount: Money,
        user_id: UserId,
    ) -> EngineResult<Shift> {
        self.record_cash(shift_id, amount, user_id, false)
    }

    pub fn record_cash_refund(
        &self,
        shift_id: ShiftId,
        amount: Money,
        user_id: UserId,
    ) -> EngineResult<Shift> {
        self.record_cash(shift_id, amount, user_id, true)
    }

    fn record_cash(
        &self,
        shift_id: ShiftId,
        amount: Money,
        user_id: UserId,
        refund: bool,
    ) -> EngineResult<Shift> {
        let mut shift = self.shift(shift_id)?;
        let cash = RecordCash {
            tenant_id: self.tenant_id,
            till_id: shift.till_id,
            shift_id,
            amount,
            user_id,
            occurred_at: Utc::now(),
        };
        let command = if refund {
            TillCommand::RecordCashRefund(cash)
        } else {
            TillCommand::RecordCashSale(cash)
        };
        let done = self.till_command(shift.till_id, &command)?;
        for event in &done.events {
            event.apply_to_shift(&mut shift);
        }
        Ok(shift)
    }

    /// Close a running shift, reconcile its drawer and release the till.
    ///
    /// The summary is published once the close is committed; a failed
    /// publish is logged and does not undo the close.
    #[instrument(skip(self, closing_cash, notes), fields(tenant_id = %self.tenant_id, shift_id = %shift_id))]
    pub fn close_shift(
        &self,
        shift_id: ShiftId,
        closing_cash: Money,
        notes: Option<String>,
        user_id: UserId,
    ) -> EngineResult<Shift> {
        let mut shift = self.shift(shift_id)?;
        let command = TillCommand::CloseShift(CloseShift {
            tenant_id: self.tenant_id,
            till_id: shift.till_id,
            shift_id,
            closing_cash,
            notes,
            user_id,
            occurred_at: Utc::now(),
        });
        let done = self.till_command(shift.till_id, &command)?;
        for event in &done.events {
            event.apply_to_shift(&mut shift);
        }

        if let Some(summary) = shift.summary() {
            info!(
                till_id = %summary.till_id,
                expected = summary.cash.expected.minor(),
                variance = summary.cash.variance.minor(),
                "shift closed"
            );
            if let Err(e) = self.engine.summaries.publish(summary) {
                warn!(error = ?e, "shift summary not published");
            }
        }
        Ok(shift)
    }

    pub fn shift(&self, shift_id: ShiftId) -> EngineResult<Shift> {
        self.engine
            .shifts
            .get(self.tenant_id, shift_id)
            .ok_or_else(|| EngineError::not_found(format!("shift {shift_id}")))
    }

    /// Shifts newest first, optionally narrowed by outlet and status.
    pub fn shifts(&self, outlet_id: Option<OutletId>, status: Option<ShiftStatus>) -> Vec<Shift> {
        self.engine
            .shifts
            .list(self.tenant_id)
            .into_iter()
            .filter(|s| outlet_id.is_none_or(|o| s.outlet_id == o))
            .filter(|s| status.is_none_or(|st| s.status == st))
            .collect()
    }

    fn till_command(&self, till_id: TillId, command: &TillCommand) -> EngineResult<Dispatched<Till>> {
        let done = self.execute(
            TILL_STREAM,
            till_id.as_aggregate(),
            command,
            &self.engine.tills,
            |id| Till::empty(id.into()),
        )?;
        if let Err(e) = self
            .engine
            .shifts
            .apply(
                self.tenant_id,
                self.engine.dispatcher.store().as_ref(),
                &done.committed,
                &done.events,
            )
        {
            warn!(till_id = %till_id, error = %e, "shift view not updated");
        }
        Ok(done)
    }
}

fn view(till: &Till) -> EngineResult<TillView> {
    TillView::of(till).ok_or_else(|| EngineError::not_found(format!("outlet of till {}", till.name())))
}
