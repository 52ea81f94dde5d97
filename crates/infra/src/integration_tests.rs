//! Integration tests for the full pipeline.
//!
//! Tests: Command → EventStore → Projection, Movement → Ledger → StockLevels
//!
//! Verifies:
//! - Movements fold into the stock and transfer views correctly
//! - Till exclusivity holds under concurrent shift starts
//! - Tenant isolation is preserved
//! - Rebuilt read models match incrementally maintained ones

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::time::Duration;

    use chrono::Utc;

    use posledger_core::{Conflict, Money, OutletId, ProductId, TenantId, UserId};
    use posledger_inventory::{
        MatchedBy, MovementType, NewMovement, QuantitySign, SettingsTarget, StockSettings,
        TransferStatus,
    };
    use posledger_tills::ShiftStatus;
    use proptest::prelude::*;

    use crate::config::EngineConfig;
    use crate::engine::{Engine, TenantScope};
    use crate::error::EngineError;
    use crate::ledger::MovementFilter;

    fn engine() -> Engine {
        Engine::in_memory(EngineConfig::default())
    }

    fn movement(
        outlet_id: OutletId,
        product_id: ProductId,
        movement_type: MovementType,
        quantity: i64,
    ) -> NewMovement {
        NewMovement {
            outlet_id,
            product_id,
            variation_id: None,
            movement_type,
            quantity,
            unit_cost: None,
            reference_id: None,
            counterpart_outlet_id: None,
            supplier_id: None,
            reason: None,
            actor: UserId::new(),
            occurred_at: None,
        }
    }

    fn with_reference(mut m: NewMovement, reference: &str) -> NewMovement {
        m.reference_id = Some(reference.to_string());
        m
    }

    /// One outlet and one tracked product with threshold 5.
    fn shop(scope: &TenantScope<'_>) -> (OutletId, ProductId) {
        let outlet = scope.register_outlet("Harbour St").unwrap();
        let product = scope
            .register_product("Flat white beans", Some("FW-1".into()), StockSettings::tracked(5))
            .unwrap();
        (outlet.outlet_id, product.product_id)
    }

    #[tokio::test]
    async fn purchase_then_sale_leaves_thirty_eight() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        scope
            .record_movement(movement(outlet, product, MovementType::Purchase, 50), None)
            .await
            .unwrap();
        scope
            .record_movement(movement(outlet, product, MovementType::Sale, -12), None)
            .await
            .unwrap();

        let stock = scope.current_stock(outlet, product, None).await.unwrap();
        assert_eq!(stock.quantity, 38);
        assert_eq!(stock.movement_count, 2);
        assert_eq!(stock.totals_by_type.purchase, 50);
        assert_eq!(stock.totals_by_type.sale, -12);
        assert_eq!(stock.watermark, 2);
        assert!(!stock.is_low);
        assert!(!stock.negative_stock);
    }

    #[tokio::test]
    async fn items_without_movements_have_zero_stock() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        let stock = scope.current_stock(outlet, product, None).await.unwrap();
        assert_eq!(stock.quantity, 0);
        // Tracked with threshold 5, so zero stock is low.
        assert!(stock.is_low);
    }

    #[tokio::test]
    async fn overselling_is_recorded_and_flagged() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        scope
            .record_movement(movement(outlet, product, MovementType::Sale, -3), None)
            .await
            .unwrap();

        let stock = scope.current_stock(outlet, product, None).await.unwrap();
        assert_eq!(stock.quantity, -3);
        assert!(stock.negative_stock);
    }

    #[tokio::test]
    async fn low_stock_boundary_is_inclusive() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        scope
            .record_movement(movement(outlet, product, MovementType::Purchase, 6), None)
            .await
            .unwrap();
        let report = scope.low_stock(Some(outlet)).await.unwrap();
        assert!(report.items.is_empty(), "T+1 is not low");

        scope
            .record_movement(movement(outlet, product, MovementType::Sale, -1), None)
            .await
            .unwrap();
        let report = scope.low_stock(Some(outlet)).await.unwrap();
        assert_eq!(report.items.len(), 1, "T is low");
        assert_eq!(report.items[0].quantity, 5);
        assert_eq!(report.items[0].product_name, "Flat white beans");
        assert_eq!(report.watermark, 2);
    }

    #[tokio::test]
    async fn tracked_variation_settings_replace_product_settings() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);
        let (large, _) = scope
            .add_variation(product, "1kg", None, StockSettings::tracked(2))
            .unwrap();
        let (small, _) = scope
            .add_variation(product, "250g", None, StockSettings::untracked())
            .unwrap();

        let mut buy_large = movement(outlet, product, MovementType::Purchase, 3);
        buy_large.variation_id = Some(large);
        scope.record_movement(buy_large, None).await.unwrap();
        let mut buy_small = movement(outlet, product, MovementType::Purchase, 1);
        buy_small.variation_id = Some(small);
        scope.record_movement(buy_small, None).await.unwrap();

        // Product threshold 5 no longer applies; 1kg at 3 > 2, 250g untracked.
        assert!(scope.low_stock(Some(outlet)).await.unwrap().items.is_empty());

        scope
            .change_stock_settings(product, SettingsTarget::Variation(large), StockSettings::tracked(3))
            .unwrap();
        let report = scope.low_stock(Some(outlet)).await.unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].variation_id, Some(large));

        let product_level = scope.current_stock(outlet, product, None).await.unwrap();
        assert_eq!(product_level.quantity, 4);
        assert!(!product_level.is_low);
    }

    #[tokio::test]
    async fn transfer_with_reference_completes() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (a, product) = shop(&scope);
        let b = scope.register_outlet("Dock Rd").unwrap().outlet_id;

        let mut out = with_reference(movement(a, product, MovementType::TransferOut, -10), "X");
        out.counterpart_outlet_id = Some(b);
        scope.record_movement(out, None).await.unwrap();
        scope
            .record_movement(with_reference(movement(b, product, MovementType::TransferIn, 10), "X"), None)
            .await
            .unwrap();

        let report = scope.transfers(None).await.unwrap();
        assert_eq!(report.transfers.len(), 1);
        let transfer = &report.transfers[0];
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert_eq!(transfer.from_outlet, a);
        assert_eq!(transfer.to_outlet, Some(b));
        assert_eq!(transfer.quantity, 10);
        assert_eq!(transfer.matched_by, Some(MatchedBy::Reference));
        assert!(report.unmatched_inbound.is_empty());

        assert_eq!(scope.current_stock(a, product, None).await.unwrap().quantity, -10);
        assert_eq!(scope.current_stock(b, product, None).await.unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn unmatched_transfer_out_is_pending_with_unknown_destination() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (a, product) = shop(&scope);
        let b = scope.register_outlet("Dock Rd").unwrap().outlet_id;

        let mut out = with_reference(movement(a, product, MovementType::TransferOut, -4), "T-9");
        out.counterpart_outlet_id = Some(b);
        scope.record_movement(out, None).await.unwrap();

        let report = scope.transfers(Some(a)).await.unwrap();
        assert_eq!(report.transfers.len(), 1);
        assert_eq!(report.transfers[0].status, TransferStatus::Pending);
        assert_eq!(report.transfers[0].to_outlet, None);
        assert_eq!(report.transfers[0].intended_to_outlet, Some(b));
    }

    #[tokio::test]
    async fn idempotent_retry_records_once() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        let sale = movement(outlet, product, MovementType::Purchase, 7);
        let first = scope
            .record_movement(sale.clone(), Some("till-7-receipt-1".into()))
            .await
            .unwrap();
        let again = scope
            .record_movement(sale.clone(), Some("till-7-receipt-1".into()))
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(again.replayed);
        assert_eq!(first.movement.movement_id, again.movement.movement_id);
        assert_eq!(scope.current_stock(outlet, product, None).await.unwrap().quantity, 7);

        let mut different = sale;
        different.quantity = 8;
        let err = scope
            .record_movement(different, Some("till-7-receipt-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(Conflict::IdempotencyKeyReused(_))));
    }

    #[tokio::test]
    async fn retry_rebuilt_from_the_same_request_is_replayed() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        // Each attempt builds its movement afresh, the way a retried HTTP call does.
        let request = || with_reference(movement(outlet, product, MovementType::Sale, -2), "R-77");
        let first = scope
            .record_movement(request(), Some("pos-r77".into()))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let again = scope
            .record_movement(request(), Some("pos-r77".into()))
            .await
            .unwrap();
        assert!(again.replayed);
        assert_eq!(first.movement, again.movement);

        // An explicit timestamp with sub-microsecond digits still matches the
        // stored, microsecond-precision row.
        let at = chrono::DateTime::parse_from_rfc3339("2026-05-04T10:00:00.000000999Z")
            .unwrap()
            .with_timezone(&Utc);
        let stamped = || {
            let mut m = movement(outlet, product, MovementType::Purchase, 3);
            m.occurred_at = Some(at);
            m
        };
        let first = scope.record_movement(stamped(), Some("po-5".into())).await.unwrap();
        let again = scope.record_movement(stamped(), Some("po-5".into())).await.unwrap();
        assert!(again.replayed);
        assert_eq!(first.movement.movement_id, again.movement.movement_id);

        let page = scope
            .movements(&MovementFilter::default(), None, None)
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn unknown_references_and_bad_movements_are_rejected() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);

        let err = scope
            .record_movement(movement(OutletId::new(), product, MovementType::Purchase, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = scope
            .record_movement(movement(outlet, ProductId::new(), MovementType::Purchase, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = scope
            .record_movement(movement(outlet, product, MovementType::Sale, 4), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = scope
            .record_movement(movement(outlet, product, MovementType::Adjustment, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let page = scope.movements(&MovementFilter::default(), None, None).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn inactive_outlet_refuses_new_activity_but_keeps_history() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);
        let till = scope.register_till(outlet, "Till 1").unwrap();

        scope
            .record_movement(movement(outlet, product, MovementType::Purchase, 3), None)
            .await
            .unwrap();
        scope.deactivate_outlet(outlet).unwrap();

        let err = scope
            .record_movement(movement(outlet, product, MovementType::Sale, -1), None)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Conflict(Conflict::OutletInactive));

        let err = scope
            .start_shift(till.till_id, outlet, UserId::new(), Utc::now().date_naive(), Money::ZERO, Money::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::Conflict(Conflict::OutletInactive));

        assert_eq!(scope.current_stock(outlet, product, None).await.unwrap().quantity, 3);
        assert!(!scope.outlet(outlet).unwrap().active);
    }

    #[test]
    fn second_start_on_a_till_is_refused() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let outlet = scope.register_outlet("Harbour St").unwrap().outlet_id;
        let till = scope.register_till(outlet, "Till 7").unwrap().till_id;
        let today = Utc::now().date_naive();

        scope
            .start_shift(till, outlet, UserId::new(), today, Money::from_major(100), Money::ZERO)
            .unwrap();
        let err = scope
            .start_shift(till, outlet, UserId::new(), today, Money::from_major(100), Money::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::Conflict(Conflict::TillInUse));

        let view = scope.till(till).unwrap();
        assert!(view.in_use);
        assert_eq!(scope.retire_till(till).unwrap_err(), EngineError::Conflict(Conflict::TillInUse));
    }

    #[test]
    fn concurrent_starts_leave_exactly_one_running_shift() {
        const RACERS: usize = 8;

        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let outlet = scope.register_outlet("Harbour St").unwrap().outlet_id;
        let till = scope.register_till(outlet, "Till 7").unwrap().till_id;
        let today = Utc::now().date_naive();
        let barrier = Barrier::new(RACERS);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..RACERS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        scope.start_shift(till, outlet, UserId::new(), today, Money::from_major(50), Money::ZERO)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let started = results.iter().filter(|r| r.is_ok()).count();
        let in_use = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::Conflict(Conflict::TillInUse))))
            .count();
        assert_eq!(started, 1);
        assert_eq!(in_use, RACERS - 1);
        assert_eq!(scope.shifts(Some(outlet), Some(ShiftStatus::Running)).len(), 1);
    }

    #[test]
    fn concurrent_cash_sales_all_reach_the_shift_view() {
        const CASHIERS: i64 = 4;

        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let outlet = scope.register_outlet("Harbour St").unwrap().outlet_id;
        let till = scope.register_till(outlet, "Till 3").unwrap().till_id;
        let shift_id = scope
            .start_shift(till, outlet, UserId::new(), Utc::now().date_naive(), Money::ZERO, Money::ZERO)
            .unwrap()
            .shift_id;
        let barrier = Barrier::new(CASHIERS as usize);

        std::thread::scope(|s| {
            for i in 1..=CASHIERS {
                let (scope, barrier) = (&scope, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    scope
                        .record_cash_sale(shift_id, Money::from_minor(i * 100), UserId::new())
                        .unwrap();
                });
            }
        });

        let shift = scope.shift(shift_id).unwrap();
        assert_eq!(shift.sale_count, CASHIERS as u32);
        assert_eq!(shift.cash_sales, Money::from_minor(1_000));

        let closed = scope
            .close_shift(shift_id, Money::from_minor(1_000), None, UserId::new())
            .unwrap();
        assert_eq!(closed.status, ShiftStatus::Completed);
        assert!(!scope.till(till).unwrap().in_use);
    }

    #[test]
    fn close_reconciles_cash_and_publishes_summary() {
        let engine = engine();
        let tenant = TenantId::new();
        let scope = engine.tenant(tenant);
        let feed = scope.subscribe_summaries();
        let other_feed = engine.tenant(TenantId::new()).subscribe_summaries();

        let outlet = scope.register_outlet("Harbour St").unwrap().outlet_id;
        let till = scope.register_till(outlet, "Till 1").unwrap().till_id;
        let cashier = UserId::new();
        let shift = scope
            .start_shift(till, outlet, cashier, Utc::now().date_naive(), Money::from_major(100), Money::ZERO)
            .unwrap();

        scope.record_cash_sale(shift.shift_id, Money::from_major(250), cashier).unwrap();
        scope.record_cash_refund(shift.shift_id, Money::from_major(20), cashier).unwrap();
        let closed = scope
            .close_shift(shift.shift_id, Money::from_major(335), Some("busy lunch".into()), cashier)
            .unwrap();

        assert_eq!(closed.status, ShiftStatus::Completed);
        let cash = closed.reconciliation.unwrap();
        assert_eq!(cash.expected, Money::from_major(330));
        assert_eq!(cash.variance, Money::from_major(5));
        assert!(!scope.till(till).unwrap().in_use);
        assert_eq!(scope.shift(shift.shift_id).unwrap(), closed);

        let summary = feed.next_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(summary.tenant_id, tenant);
        assert_eq!(summary.shift_id, shift.shift_id);
        assert_eq!(summary.sale_count, 1);
        assert_eq!(summary.refund_count, 1);
        assert!(other_feed.next_timeout(Duration::from_millis(50)).is_err());

        let err = scope
            .close_shift(shift.shift_id, Money::from_major(335), None, cashier)
            .unwrap_err();
        assert_eq!(err, EngineError::Conflict(Conflict::ShiftNotRunning));
    }

    #[tokio::test]
    async fn tenants_never_see_each_other() {
        let engine = engine();
        let a = engine.tenant(TenantId::new());
        let b = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&a);
        a.record_movement(movement(outlet, product, MovementType::Purchase, 9), Some("k-1".into()))
            .await
            .unwrap();

        assert!(b.outlets().is_empty());
        assert!(b.products().is_empty());
        assert!(matches!(b.outlet(outlet), Err(EngineError::NotFound(_))));
        let err = b
            .record_movement(movement(outlet, product, MovementType::Purchase, 9), Some("k-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(b.movements(&MovementFilter::default(), None, None).await.unwrap().total, 0);
        assert!(b.transfers(None).await.unwrap().transfers.is_empty());
    }

    #[tokio::test]
    async fn late_supplier_attribution_joins_into_history() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (outlet, product) = shop(&scope);
        let roaster = scope.register_supplier("Roastery Co").unwrap().supplier_id;
        let other = scope.register_supplier("Bean Bros").unwrap().supplier_id;

        scope
            .record_movement(with_reference(movement(outlet, product, MovementType::Purchase, 20), "PO-77"), None)
            .await
            .unwrap();
        let before = scope.adjustment_history(Some(outlet), None, None).await.unwrap();
        assert_eq!(before.entries[0].attributed_supplier_id, None);

        let err = scope.attribute_reference(roaster, "PO-404").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        scope.attribute_reference(roaster, "PO-77").await.unwrap();
        let after = scope.adjustment_history(Some(outlet), None, None).await.unwrap();
        assert_eq!(after.entries[0].attributed_supplier_id, Some(roaster));
        assert_eq!(after.entries[0].movement.supplier_id, None, "ledger row untouched");

        let err = scope.attribute_reference(other, "PO-77").await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(Conflict::AlreadyAttributed(_))));
    }

    #[tokio::test]
    async fn rebuilt_read_models_match_incremental_ones() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let (a, product) = shop(&scope);
        let b = scope.register_outlet("Dock Rd").unwrap().outlet_id;
        let till = scope.register_till(a, "Till 1").unwrap().till_id;
        let cashier = UserId::new();
        let shift = scope
            .start_shift(till, a, cashier, Utc::now().date_naive(), Money::from_major(10), Money::ZERO)
            .unwrap();
        scope.record_cash_sale(shift.shift_id, Money::from_major(4), cashier).unwrap();

        for (outlet, t, q) in [
            (a, MovementType::Purchase, 30),
            (a, MovementType::Sale, -4),
            (a, MovementType::TransferOut, -6),
            (b, MovementType::TransferIn, 6),
            (b, MovementType::Adjustment, -1),
        ] {
            scope.record_movement(movement(outlet, product, t, q), None).await.unwrap();
        }

        let stock_a = scope.current_stock(a, product, None).await.unwrap();
        let stock_b = scope.current_stock(b, product, None).await.unwrap();
        let outlets = scope.outlets();
        let tills = scope.tills(None);
        let shifts = scope.shifts(None, None);

        let report = scope.rebuild_read_models().await.unwrap();
        assert_eq!(report.stock_watermark, 5);
        assert_eq!(report.outlets, 2);
        assert_eq!(report.tills, 1);
        assert_eq!(report.shifts, 1);

        assert_eq!(scope.current_stock(a, product, None).await.unwrap(), stock_a);
        assert_eq!(scope.current_stock(b, product, None).await.unwrap(), stock_b);
        assert_eq!(scope.outlets(), outlets);
        assert_eq!(scope.tills(None), tills);
        assert_eq!(scope.shifts(None, None), shifts);
        assert_eq!(stock_a.quantity, 20);
        assert_eq!(stock_b.quantity, 5);
    }

    #[test]
    fn retired_tills_leave_the_registry() {
        let engine = engine();
        let scope = engine.tenant(TenantId::new());
        let a = scope.register_outlet("Harbour St").unwrap().outlet_id;
        let b = scope.register_outlet("Dock Rd").unwrap().outlet_id;
        let till = scope.register_till(a, "Till 1").unwrap().till_id;

        let moved = scope.reassign_till(till, b).unwrap();
        assert_eq!(moved.outlet_id, b);
        assert_eq!(scope.tills(Some(a)).len(), 0);
        assert_eq!(scope.tills(Some(b)).len(), 1);

        scope.retire_till(till).unwrap();
        assert!(scope.tills(None).is_empty());
        assert!(matches!(scope.till(till), Err(EngineError::NotFound(_))));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Record {
            outlet: usize,
            movement_type: MovementType,
            quantity: i64,
        },
        Read {
            outlet: usize,
        },
    }

    fn step() -> impl Strategy<Value = Step> {
        let types = vec![
            MovementType::Purchase,
            MovementType::Sale,
            MovementType::Return,
            MovementType::Adjustment,
        ];
        prop_oneof![
            3 => (0..2usize, prop::sample::select(types), 1..40i64).prop_map(
                |(outlet, movement_type, magnitude)| {
                    let quantity = match movement_type.sign() {
                        QuantitySign::Negative => -magnitude,
                        _ => magnitude,
                    };
                    Step::Record { outlet, movement_type, quantity }
                }
            ),
            1 => (0..2usize).prop_map(|outlet| Step::Read { outlet }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reads_interleaved_with_appends_match_a_rebuild(steps in prop::collection::vec(step(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (incremental, rebuilt, expected) = rt.block_on(async {
                let engine = engine();
                let scope = engine.tenant(TenantId::new());
                let (a, product) = shop(&scope);
                let b = scope.register_outlet("Dock Rd").unwrap().outlet_id;
                let outlets = [a, b];
                let mut expected = [0i64; 2];

                for step in &steps {
                    match *step {
                        Step::Record { outlet, movement_type, quantity } => {
                            scope
                                .record_movement(movement(outlets[outlet], product, movement_type, quantity), None)
                                .await
                                .unwrap();
                            expected[outlet] += quantity;
                        }
                        Step::Read { outlet } => {
                            scope.current_stock(outlets[outlet], product, None).await.unwrap();
                        }
                    }
                }

                let mut incremental = Vec::new();
                for outlet in outlets {
                    incremental.push(scope.current_stock(outlet, product, None).await.unwrap());
                }
                scope.rebuild_read_models().await.unwrap();
                let mut rebuilt = Vec::new();
                for outlet in outlets {
                    rebuilt.push(scope.current_stock(outlet, product, None).await.unwrap());
                }
                (incremental, rebuilt, expected)
            });

            prop_assert_eq!(&incremental, &rebuilt);
            for (view, quantity) in incremental.iter().zip(expected) {
                prop_assert_eq!(view.quantity, quantity);
            }
        }
    }
}
