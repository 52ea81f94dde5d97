use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use posledger_core::TenantId;
use posledger_events::ProjectionRunner;
use posledger_inventory::StockLevels;

use crate::ledger::MovementLedger;

use super::ProjectionFailure;

/// Movements pulled from the ledger per round trip.
pub const CATCH_UP_BATCH: usize = 500;

/// Materialized stock levels, one runner per tenant.
///
/// The runner's cursor is the tenant's watermark: the last ledger position
/// folded. `catch_up` pulls everything past it, so a read after a write sees
/// that write. A full rebuild must produce the same levels.
#[derive(Debug, Default)]
pub struct StockLevelsProjection {
    runners: RwLock<HashMap<TenantId, ProjectionRunner<StockLevels>>>,
}

impl StockLevelsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watermark(&self, tenant_id: TenantId) -> u64 {
        self.runners
            .read()
            .ok()
            .and_then(|r| r.get(&tenant_id).map(|run| run.projection().watermark()))
            .unwrap_or(0)
    }

    /// Fold every movement past the watermark. Returns how many were applied.
    pub async fn catch_up(
        &self,
        tenant_id: TenantId,
        ledger: &dyn MovementLedger,
    ) -> Result<usize, ProjectionFailure> {
        let mut applied = 0;
        loop {
            let after = self.watermark(tenant_id);
            let batch = ledger.read_after(tenant_id, after, CATCH_UP_BATCH).await?;
            let fetched = batch.len();

            {
                let mut runners = self.runners.write().map_err(|_| ProjectionFailure::Poisoned)?;
                let runner = runners
                    .entry(tenant_id)
                    .or_insert_with(|| ProjectionRunner::new_for_tenant(tenant_id, StockLevels::new()));
                for movement in &batch {
                    // A concurrent catch-up may already have folded part of the batch.
                    if movement.position <= runner.projection().watermark() {
                        continue;
                    }
                    runner.apply(&movement.to_envelope())?;
                    applied += 1;
                }
            }

            if fetched < CATCH_UP_BATCH {
                break;
            }
        }

        if applied > 0 {
            debug!(tenant_id = %tenant_id, applied, "stock levels caught up");
        }
        Ok(applied)
    }

    /// Discard the tenant's levels and refold the whole ledger.
    ///
    /// The fold runs outside the lock; the result is swapped in at the end.
    pub async fn rebuild(
        &self,
        tenant_id: TenantId,
        ledger: &dyn MovementLedger,
    ) -> Result<u64, ProjectionFailure> {
        let mut runner = ProjectionRunner::new_for_tenant(tenant_id, StockLevels::new());
        let mut after = 0;
        loop {
            let batch = ledger.read_after(tenant_id, after, CATCH_UP_BATCH).await?;
            let envelopes: Vec<_> = batch.iter().map(|m| m.to_envelope()).collect();
            runner.run(&envelopes)?;
            after = runner.projection().watermark();
            if batch.len() < CATCH_UP_BATCH {
                break;
            }
        }

        let watermark = runner.projection().watermark();
        self.runners
            .write()
            .map_err(|_| ProjectionFailure::Poisoned)?
            .insert(tenant_id, runner);

        info!(tenant_id = %tenant_id, watermark, "stock levels rebuilt");
        Ok(watermark)
    }

    /// Read the tenant's current levels.
    pub fn read<R>(&self, tenant_id: TenantId, f: impl FnOnce(&StockLevels) -> R) -> Result<R, ProjectionFailure> {
        let runners = self.runners.read().map_err(|_| ProjectionFailure::Poisoned)?;
        Ok(match runners.get(&tenant_id) {
            Some(runner) => f(runner.projection()),
            None => f(&StockLevels::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posledger_core::{OutletId, ProductId, UserId};
    use posledger_inventory::{MovementType, NewMovement};

    use crate::ledger::InMemoryMovementLedger;

    fn movement(outlet_id: OutletId, product_id: ProductId, t: MovementType, quantity: i64) -> NewMovement {
        NewMovement {
            outlet_id,
            product_id,
            variation_id: None,
            movement_type: t,
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

    #[tokio::test]
    async fn catch_up_is_incremental_and_matches_rebuild() {
        let ledger = InMemoryMovementLedger::new();
        let projection = StockLevelsProjection::new();
        let (tenant, outlet, product) = (TenantId::new(), OutletId::new(), ProductId::new());

        ledger
            .append(tenant, movement(outlet, product, MovementType::Purchase, 50), None)
            .await
            .unwrap();
        assert_eq!(projection.catch_up(tenant, &ledger).await.unwrap(), 1);

        // Another tenant's writes advance the store position but not this tenant's levels.
        ledger
            .append(TenantId::new(), movement(outlet, product, MovementType::Purchase, 7), None)
            .await
            .unwrap();
        ledger
            .append(tenant, movement(outlet, product, MovementType::Sale, -12), None)
            .await
            .unwrap();
        assert_eq!(projection.catch_up(tenant, &ledger).await.unwrap(), 1);
        assert_eq!(projection.catch_up(tenant, &ledger).await.unwrap(), 0);

        let incremental = projection.read(tenant, |l| l.clone()).unwrap();
        assert_eq!(incremental.quantity(outlet, product, None), 38);
        assert_eq!(incremental.watermark(), 3);

        projection.rebuild(tenant, &ledger).await.unwrap();
        let rebuilt = projection.read(tenant, |l| l.clone()).unwrap();
        assert_eq!(rebuilt, incremental);
    }

    #[tokio::test]
    async fn unknown_tenant_reads_empty_levels() {
        let projection = StockLevelsProjection::new();
        let q = projection
            .read(TenantId::new(), |l| l.quantity(OutletId::new(), ProductId::new(), None))
            .unwrap();
        assert_eq!(q, 0);
    }
}
