//! Transfer reconciliation.
//!
//! A transfer between outlets is recorded as two independent ledger rows: a
//! `transfer_out` at the source and a `transfer_in` at the destination. The
//! two are not linked when written, so a logical transfer is derived by
//! pairing them. `transfer_out` is the primary record; an out with no
//! matching in is a pending transfer whose destination is unknown.
//!
//! Pairing rules that hold whatever strategy is used:
//! - both sides name the same product and variation
//! - both sides move the same absolute quantity
//! - the two outlets differ
//! - a `transfer_in` completes at most one `transfer_out`
//!
//! A `TransferMatcher` only narrows which of those candidates are acceptable
//! in each of its passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{MovementId, OutletId, ProductId, VariationId};

use crate::movement::{MovementType, StockMovement};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
}

/// Which pass paired the two sides.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Reference,
    SameDayHeuristic,
}

/// A pairing strategy.
pub trait TransferMatcher: Send + Sync + core::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Passes to run, in order. Each pass only sees outs left unmatched by the
    /// passes before it.
    fn passes(&self) -> &'static [MatchedBy];

    /// Whether `inbound` may complete `outbound` in `pass`.
    ///
    /// Only called for candidates that already satisfy the pairing rules.
    fn accepts(&self, pass: MatchedBy, outbound: &StockMovement, inbound: &StockMovement) -> bool;
}

/// Reference ids first, then a same-day heuristic for the leftovers.
#[derive(Debug, Default, Copy, Clone)]
pub struct ReferenceThenHeuristic;

impl TransferMatcher for ReferenceThenHeuristic {
    fn name(&self) -> &'static str {
        "reference_then_heuristic"
    }

    fn passes(&self) -> &'static [MatchedBy] {
        &[MatchedBy::Reference, MatchedBy::SameDayHeuristic]
    }

    fn accepts(&self, pass: MatchedBy, outbound: &StockMovement, inbound: &StockMovement) -> bool {
        match pass {
            MatchedBy::Reference => same_reference(outbound, inbound),
            MatchedBy::SameDayHeuristic => {
                outbound.occurred_at.date_naive() == inbound.occurred_at.date_naive()
                    && counterparts_agree(outbound, inbound)
            }
        }
    }
}

/// Reference ids only; anything without a matching reference stays pending.
#[derive(Debug, Default, Copy, Clone)]
pub struct StrictReference;

impl TransferMatcher for StrictReference {
    fn name(&self) -> &'static str {
        "strict_reference"
    }

    fn passes(&self) -> &'static [MatchedBy] {
        &[MatchedBy::Reference]
    }

    fn accepts(&self, pass: MatchedBy, outbound: &StockMovement, inbound: &StockMovement) -> bool {
        pass == MatchedBy::Reference && same_reference(outbound, inbound)
    }
}

fn same_reference(outbound: &StockMovement, inbound: &StockMovement) -> bool {
    matches!(
        (&outbound.reference_id, &inbound.reference_id),
        (Some(a), Some(b)) if a == b
    )
}

/// Declared counterparts, where present, must point at each other.
fn counterparts_agree(outbound: &StockMovement, inbound: &StockMovement) -> bool {
    outbound
        .counterpart_outlet_id
        .is_none_or(|to| to == inbound.outlet_id)
        && inbound
            .counterpart_outlet_id
            .is_none_or(|from| from == outbound.outlet_id)
}

fn pairable(outbound: &StockMovement, inbound: &StockMovement) -> bool {
    outbound.product_id == inbound.product_id
        && outbound.variation_id == inbound.variation_id
        && outbound.magnitude() == inbound.magnitude()
        && outbound.outlet_id != inbound.outlet_id
}

/// A logical transfer derived from one `transfer_out` and at most one `transfer_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_out_id: MovementId,
    pub transfer_in_id: Option<MovementId>,
    pub from_outlet: OutletId,
    /// `None` while pending: the destination is unknown.
    pub to_outlet: Option<OutletId>,
    /// Destination named on the `transfer_out`, if any.
    pub intended_to_outlet: Option<OutletId>,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: u64,
    pub reference_id: Option<String>,
    pub status: TransferStatus,
    pub matched_by: Option<MatchedBy>,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Whether the transfer left from or arrived at `outlet_id`.
    pub fn touches(&self, outlet_id: OutletId) -> bool {
        self.from_outlet == outlet_id
            || self.to_outlet == Some(outlet_id)
            || self.intended_to_outlet == Some(outlet_id)
    }
}

/// `transfer_in` rows that no `transfer_out` accounts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedInbound {
    pub transfer_in_id: MovementId,
    pub to_outlet: OutletId,
    pub declared_from_outlet: Option<OutletId>,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: u64,
    pub reference_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferReport {
    pub transfers: Vec<Transfer>,
    pub unmatched_inbound: Vec<UnmatchedInbound>,
}

impl TransferReport {
    /// Restrict to transfers touching `outlet_id` (and orphans received there).
    pub fn for_outlet(self, outlet_id: OutletId) -> Self {
        Self {
            transfers: self
                .transfers
                .into_iter()
                .filter(|t| t.touches(outlet_id))
                .collect(),
            unmatched_inbound: self
                .unmatched_inbound
                .into_iter()
                .filter(|u| u.to_outlet == outlet_id || u.declared_from_outlet == Some(outlet_id))
                .collect(),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers
            .iter()
            .filter(|t| t.status == TransferStatus::Pending)
    }
}

/// Pair the transfer rows of one tenant's ledger.
///
/// Non-transfer movements are ignored. Outs and ins are considered in ledger
/// order, so each out takes the earliest acceptable unconsumed in.
pub fn reconcile<'a>(
    movements: impl IntoIterator<Item = &'a StockMovement>,
    matcher: &dyn TransferMatcher,
) -> TransferReport {
    let mut outs: Vec<&StockMovement> = Vec::new();
    let mut ins: Vec<&StockMovement> = Vec::new();
    for m in movements {
        match m.movement_type {
            MovementType::TransferOut => outs.push(m),
            MovementType::TransferIn => ins.push(m),
            _ => {}
        }
    }
    outs.sort_by_key(|m| m.position);
    ins.sort_by_key(|m| m.position);

    let mut matched: Vec<Option<(usize, MatchedBy)>> = vec![None; outs.len()];
    let mut consumed = vec![false; ins.len()];

    for &pass in matcher.passes() {
        for (oi, out) in outs.iter().enumerate() {
            if matched[oi].is_some() {
                continue;
            }
            let candidate = ins.iter().enumerate().find(|(ii, inbound)| {
                !consumed[*ii] && pairable(out, inbound) && matcher.accepts(pass, out, inbound)
            });
            if let Some((ii, _)) = candidate {
                consumed[ii] = true;
                matched[oi] = Some((ii, pass));
            }
        }
    }

    let transfers = outs
        .iter()
        .zip(&matched)
        .map(|(out, pairing)| {
            let inbound = pairing.map(|(ii, by)| (ins[ii], by));
            Transfer {
                transfer_out_id: out.movement_id,
                transfer_in_id: inbound.map(|(i, _)| i.movement_id),
                from_outlet: out.outlet_id,
                to_outlet: inbound.map(|(i, _)| i.outlet_id),
                intended_to_outlet: out.counterpart_outlet_id,
                product_id: out.product_id,
                variation_id: out.variation_id,
                quantity: out.magnitude(),
                reference_id: out.reference_id.clone(),
                status: if inbound.is_some() {
                    TransferStatus::Completed
                } else {
                    TransferStatus::Pending
                },
                matched_by: inbound.map(|(_, by)| by),
                sent_at: out.occurred_at,
                received_at: inbound.map(|(i, _)| i.occurred_at),
            }
        })
        .collect();

    let unmatched_inbound = ins
        .iter()
        .zip(&consumed)
        .filter(|(_, used)| !**used)
        .map(|(i, _)| UnmatchedInbound {
            transfer_in_id: i.movement_id,
            to_outlet: i.outlet_id,
            declared_from_outlet: i.counterpart_outlet_id,
            product_id: i.product_id,
            variation_id: i.variation_id,
            quantity: i.magnitude(),
            reference_id: i.reference_id.clone(),
            received_at: i.occurred_at,
        })
        .collect();

    TransferReport {
        transfers,
        unmatched_inbound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::NewMovement;
    use chrono::{Duration, TimeZone};
    use posledger_core::{TenantId, UserId};
    use proptest::prelude::*;
    use std::collections::HashSet;

    struct Ledger {
        tenant: TenantId,
        movements: Vec<StockMovement>,
    }

    impl Ledger {
        fn new() -> Self {
            Self {
                tenant: TenantId::new(),
                movements: Vec::new(),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn push(
            &mut self,
            outlet_id: OutletId,
            product_id: ProductId,
            movement_type: MovementType,
            quantity: i64,
            reference_id: Option<&str>,
            counterpart: Option<OutletId>,
            occurred_at: DateTime<Utc>,
        ) -> MovementId {
            let id = MovementId::new();
            self.movements.push(StockMovement::record(
                self.tenant,
                id,
                self.movements.len() as u64 + 1,
                occurred_at,
                None,
                NewMovement {
                    outlet_id,
                    product_id,
                    variation_id: None,
                    movement_type,
                    quantity,
                    unit_cost: None,
                    reference_id: reference_id.map(str::to_string),
                    counterpart_outlet_id: counterpart,
                    supplier_id: None,
                    reason: None,
                    actor: UserId::new(),
                    occurred_at: Some(occurred_at),
                },
            ));
            id
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn reference_match_completes_transfer() {
        let (a, b, p) = (OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        let out = ledger.push(a, p, MovementType::TransferOut, -10, Some("X"), None, noon());
        let inn = ledger.push(b, p, MovementType::TransferIn, 10, Some("X"), None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers.len(), 1);
        let t = &report.transfers[0];
        assert_eq!(t.transfer_out_id, out);
        assert_eq!(t.transfer_in_id, Some(inn));
        assert_eq!(t.to_outlet, Some(b));
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.matched_by, Some(MatchedBy::Reference));
        assert!(report.unmatched_inbound.is_empty());
    }

    #[test]
    fn out_without_in_is_pending_with_unknown_destination() {
        let (a, b, p) = (OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -4, None, Some(b), noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        let t = &report.transfers[0];
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.to_outlet, None);
        assert_eq!(t.intended_to_outlet, Some(b));
        assert!(t.touches(b));
    }

    #[test]
    fn heuristic_pairs_same_day_same_quantity() {
        let (a, b, p) = (OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -7, None, None, noon());
        ledger.push(b, p, MovementType::TransferIn, 7, Some("typo"), None, noon() + Duration::hours(3));

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers[0].matched_by, Some(MatchedBy::SameDayHeuristic));

        let strict = reconcile(&ledger.movements, &StrictReference);
        assert_eq!(strict.transfers[0].status, TransferStatus::Pending);
        assert_eq!(strict.unmatched_inbound.len(), 1);
    }

    #[test]
    fn heuristic_rejects_other_day_or_other_quantity() {
        let (a, b, p) = (OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -7, None, None, noon());
        ledger.push(b, p, MovementType::TransferIn, 7, None, None, noon() + Duration::days(1));
        ledger.push(b, p, MovementType::TransferIn, 6, None, None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers[0].status, TransferStatus::Pending);
        assert_eq!(report.unmatched_inbound.len(), 2);
    }

    #[test]
    fn heuristic_respects_declared_destination() {
        let (a, b, c, p) = (OutletId::new(), OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -3, None, Some(c), noon());
        ledger.push(b, p, MovementType::TransferIn, 3, None, None, noon());
        let at_c = ledger.push(c, p, MovementType::TransferIn, 3, None, None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers[0].transfer_in_id, Some(at_c));
    }

    #[test]
    fn reference_match_takes_earliest_inbound_and_uses_it_once() {
        let (a, b, p) = (OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -5, Some("R"), None, noon());
        ledger.push(a, p, MovementType::TransferOut, -5, Some("R"), None, noon());
        let first_in = ledger.push(b, p, MovementType::TransferIn, 5, Some("R"), None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers[0].transfer_in_id, Some(first_in));
        assert_eq!(report.transfers[1].status, TransferStatus::Pending);
    }

    #[test]
    fn same_outlet_never_pairs() {
        let (a, p) = (OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -5, Some("R"), None, noon());
        ledger.push(a, p, MovementType::TransferIn, 5, Some("R"), None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic);
        assert_eq!(report.transfers[0].status, TransferStatus::Pending);
    }

    #[test]
    fn for_outlet_keeps_transfers_landing_there() {
        let (a, b, c, p) = (OutletId::new(), OutletId::new(), OutletId::new(), ProductId::new());
        let mut ledger = Ledger::new();
        ledger.push(a, p, MovementType::TransferOut, -1, Some("1"), None, noon());
        ledger.push(b, p, MovementType::TransferIn, 1, Some("1"), None, noon());
        ledger.push(c, p, MovementType::TransferOut, -2, None, None, noon());

        let report = reconcile(&ledger.movements, &ReferenceThenHeuristic).for_outlet(b);
        assert_eq!(report.transfers.len(), 1);
        assert_eq!(report.transfers[0].from_outlet, a);
    }

    proptest! {
        #[test]
        fn reconciliation_conserves_quantity(
            rows in proptest::collection::vec(
                (any::<bool>(), 0usize..3, 0usize..2, 1i64..5, proptest::option::of(0u8..3), 0i64..3),
                0..60,
            )
        ) {
            let outlets: Vec<_> = (0..3).map(|_| OutletId::new()).collect();
            let products: Vec<_> = (0..2).map(|_| ProductId::new()).collect();
            let mut ledger = Ledger::new();
            for (is_out, o, p, q, r, day) in &rows {
                let (t, q) = if *is_out { (MovementType::TransferOut, -q) } else { (MovementType::TransferIn, *q) };
                let reference = r.map(|r| r.to_string());
                ledger.push(outlets[*o], products[*p], t, q, reference.as_deref(), None, noon() + Duration::days(*day));
            }

            let matchers: [&dyn TransferMatcher; 2] = [&ReferenceThenHeuristic, &StrictReference];
            for matcher in matchers {
                let report = reconcile(&ledger.movements, matcher);
                let outs = ledger.movements.iter().filter(|m| m.movement_type == MovementType::TransferOut).count();
                let ins = ledger.movements.iter().filter(|m| m.movement_type == MovementType::TransferIn).count();
                prop_assert_eq!(report.transfers.len(), outs);

                let mut used = HashSet::new();
                for t in &report.transfers {
                    if let Some(in_id) = t.transfer_in_id {
                        prop_assert!(used.insert(in_id), "transfer_in consumed twice");
                        let inbound = ledger.movements.iter().find(|m| m.movement_id == in_id).unwrap();
                        prop_assert_eq!(inbound.magnitude(), t.quantity);
                        prop_assert_eq!(inbound.product_id, t.product_id);
                        prop_assert_ne!(Some(t.from_outlet), t.to_outlet);
                    }
                }
                prop_assert_eq!(used.len() + report.unmatched_inbound.len(), ins);
            }
        }
    }
}
