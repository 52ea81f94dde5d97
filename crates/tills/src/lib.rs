//! Till registry and shift state machine.
//!
//! A till (cash drawer) is an event-sourced aggregate whose stream also holds
//! the shifts run on it. "Only one running shift per till" is therefore a
//! property of a single stream: starting a shift is a conditional append at
//! the version the decision was made against.
//!
//! Shift lifecycle: `NoShift -> Running -> Completed` (terminal).

pub mod shift;
pub mod till;

pub use shift::{CashReconciliation, Shift, ShiftStatus, ShiftSummary};
pub use till::{
    CashRefundRecorded, CashSaleRecorded, CloseShift, RecordCash, RegisterTill, ShiftClosed,
    ShiftStarted, StartShift, Till, TillCommand, TillEvent, TillStatus,
};
