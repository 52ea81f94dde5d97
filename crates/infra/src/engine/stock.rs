//! Ledger writes and the stock, history and transfer views.

use tracing::{info, instrument, warn};

use posledger_core::{AggregateRoot, OutletId, ProductId, VariationId};
use posledger_inventory::{
    CatalogProduct, MovementType, NewMovement, Outlet, StockPolicy, Supplier, TransferReport,
};
use posledger_tills::Till;

use crate::error::{EngineError, EngineResult};
use crate::ledger::{AppendOutcome, MovementFilter, MovementPage};

use super::registry::attributed_supplier;
use super::views::{HistoryEntry, HistoryPage, LowStockItem, LowStockReport, RebuildReport, StockView};
use super::{TenantScope, OUTLET_STREAM, PRODUCT_STREAM, SUPPLIER_STREAM, TILL_STREAM};

impl TenantScope<'_> {
    /// Check references, then append one movement to the ledger.
    ///
    /// The append never looks at the resulting stock: a sale that drives
    /// stock negative is recorded and reported, not refused.
    #[instrument(
        skip(self, movement, idempotency_key),
        fields(
            tenant_id = %self.tenant_id,
            outlet_id = %movement.outlet_id,
            movement_type = %movement.movement_type,
        )
    )]
    pub async fn record_movement(
        &self,
        movement: NewMovement,
        idempotency_key: Option<String>,
    ) -> EngineResult<AppendOutcome> {
        self.check_references(&movement)
            .inspect_err(|e| warn!(error = %e, "movement rejected"))?;

        let outcome = self
            .engine
            .ledger
            .append(self.tenant_id, movement, idempotency_key)
            .await
            .inspect_err(|e| warn!(error = %e, "movement rejected"))?;

        if outcome.replayed {
            info!(position = outcome.movement.position, "movement replayed from idempotency key");
        } else {
            info!(
                position = outcome.movement.position,
                quantity = outcome.movement.quantity,
                "movement recorded"
            );
        }

        // The ledger row is durable; a lagging view catches up on the next read.
        if let Err(e) = self.engine.stock.catch_up(self.tenant_id, self.engine.ledger.as_ref()).await {
            warn!(error = %e, "stock view catch-up failed after append");
        }
        Ok(outcome)
    }

    fn check_references(&self, movement: &NewMovement) -> EngineResult<()> {
        self.active_outlet(movement.outlet_id)?;

        let product = self.catalog_product(movement.product_id)?;
        if let Some(variation_id) = movement.variation_id {
            if product.variation(variation_id).is_none() {
                return Err(EngineError::not_found(format!("variation {variation_id}")));
            }
        }

        if let Some(counterpart) = movement.counterpart_outlet_id {
            if counterpart == movement.outlet_id {
                return Err(EngineError::Validation(
                    "a transfer cannot name its own outlet as counterpart".into(),
                ));
            }
            // Inactive counterparts are fine: goods may arrive from a closed outlet.
            self.outlet(counterpart)?;
        }

        if let Some(supplier_id) = movement.supplier_id {
            self.supplier(supplier_id)?;
        }
        Ok(())
    }

    /// Ledger rows, newest first unless the filter says otherwise.
    pub async fn movements(
        &self,
        filter: &MovementFilter,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> EngineResult<MovementPage> {
        let pagination = self.pagination(limit, offset);
        Ok(self.engine.ledger.query(self.tenant_id, filter, pagination).await?)
    }

    /// Adjustment and purchase rows with supplier attribution joined in.
    pub async fn adjustment_history(
        &self,
        outlet_id: Option<OutletId>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> EngineResult<HistoryPage> {
        let filter = MovementFilter {
            outlet_id,
            movement_types: vec![MovementType::Adjustment, MovementType::Purchase],
            newest_first: true,
            ..MovementFilter::default()
        };
        let page = self.movements(&filter, limit, offset).await?;
        let suppliers = self.engine.suppliers.list(self.tenant_id);

        let entries = page
            .movements
            .into_iter()
            .map(|movement| {
                let attributed_supplier_id = movement.supplier_id.or_else(|| {
                    movement
                        .reference_id
                        .as_deref()
                        .and_then(|r| attributed_supplier(&suppliers, r))
                });
                HistoryEntry {
                    movement,
                    attributed_supplier_id,
                }
            })
            .collect();

        Ok(HistoryPage {
            entries,
            total: page.total,
            pagination: page.pagination,
            has_more: page.has_more,
        })
    }

    /// Current stock of a product (or one of its variations) at an outlet.
    ///
    /// The view is caught up to the ledger head first. If that fails the last
    /// folded answer is returned; its watermark shows how stale it is.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, outlet_id = %outlet_id))]
    pub async fn current_stock(
        &self,
        outlet_id: OutletId,
        product_id: ProductId,
        variation_id: Option<VariationId>,
    ) -> EngineResult<StockView> {
        self.outlet(outlet_id)?;
        let product = self.catalog_product(product_id)?;
        let policy = StockPolicy::resolve(&product, variation_id)?;

        self.refresh_stock().await;
        let (balance, watermark) = self.engine.stock.read(self.tenant_id, |levels| {
            (levels.unit_balance(outlet_id, policy.unit), levels.watermark())
        })?;
        Ok(StockView::new(outlet_id, policy, balance, watermark))
    }

    /// Units at or below their threshold, at one outlet or across all of them.
    pub async fn low_stock(&self, outlet_id: Option<OutletId>) -> EngineResult<LowStockReport> {
        let outlets: Vec<OutletId> = match outlet_id {
            Some(id) => {
                self.outlet(id)?;
                vec![id]
            }
            None => self.outlets().into_iter().map(|o| o.outlet_id).collect(),
        };
        let products: Vec<CatalogProduct> = self.engine.products.list(self.tenant_id);

        self.refresh_stock().await;
        let (low, watermark) = self.engine.stock.read(self.tenant_id, |levels| {
            let low: Vec<_> = outlets
                .iter()
                .flat_map(|o| levels.low_stock(*o, &products))
                .collect();
            (low, levels.watermark())
        })?;

        let items = low
            .iter()
            .map(|l| {
                let name = products
                    .iter()
                    .find(|p| *p.id() == l.policy.unit.product_id())
                    .map_or("", |p| p.name());
                LowStockItem::new(l, name)
            })
            .collect();
        Ok(LowStockReport { items, watermark })
    }

    /// Reconciled transfers touching `outlet_id`, or all of them.
    pub async fn transfers(&self, outlet_id: Option<OutletId>) -> EngineResult<TransferReport> {
        let report = self
            .engine
            .transfers
            .report(self.tenant_id, self.engine.ledger.as_ref())
            .await?;
        Ok(match outlet_id {
            Some(id) => report.for_outlet(id),
            None => report,
        })
    }

    /// Drop the materialized stock view and refold it from the ledger.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn rebuild_stock(&self) -> EngineResult<u64> {
        Ok(self
            .engine
            .stock
            .rebuild(self.tenant_id, self.engine.ledger.as_ref())
            .await?)
    }

    /// Refold every read model of the tenant from the event store and ledger.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn rebuild_read_models(&self) -> EngineResult<RebuildReport> {
        let store = self.engine.dispatcher.store();
        let tenant_id = self.tenant_id;

        let outlets = self.engine.outlets.rebuild(
            tenant_id,
            &store.load_by_type(tenant_id, OUTLET_STREAM)?,
            |id| Outlet::empty(id.into()),
        )?;
        let products = self.engine.products.rebuild(
            tenant_id,
            &store.load_by_type(tenant_id, PRODUCT_STREAM)?,
            |id| CatalogProduct::empty(id.into()),
        )?;
        let suppliers = self.engine.suppliers.rebuild(
            tenant_id,
            &store.load_by_type(tenant_id, SUPPLIER_STREAM)?,
            |id| Supplier::empty(id.into()),
        )?;
        let till_events = store.load_by_type(tenant_id, TILL_STREAM)?;
        let tills = self
            .engine
            .tills
            .rebuild(tenant_id, &till_events, |id| Till::empty(id.into()))?;
        let shifts = self.engine.shifts.rebuild(tenant_id, &till_events)?;
        let stock_watermark = self.rebuild_stock().await?;

        let report = RebuildReport {
            stock_watermark,
            outlets,
            products,
            suppliers,
            tills,
            shifts,
        };
        info!(?report, "read models rebuilt");
        Ok(report)
    }

    async fn refresh_stock(&self) {
        if let Err(e) = self.engine.stock.catch_up(self.tenant_id, self.engine.ledger.as_ref()).await {
            warn!(tenant_id = %self.tenant_id, error = %e, "serving stock from a stale view");
        }
    }
}
