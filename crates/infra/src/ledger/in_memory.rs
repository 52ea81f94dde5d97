use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use posledger_core::{MovementId, TenantId};
use posledger_inventory::{ledger_precision, NewMovement, StockMovement};

use super::{prepare, replay, AppendOutcome, LedgerError, MovementFilter, MovementLedger, MovementPage, Pagination};

#[derive(Debug, Default)]
struct TenantRows {
    /// Ordered by position.
    rows: Vec<StockMovement>,
    by_key: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Inner {
    last_position: u64,
    tenants: HashMap<TenantId, TenantRows>,
}

/// In-memory movement ledger for tests/dev and single-process deployments.
///
/// Position assignment and insertion happen under one write lock, so rows
/// become visible in position order. That lock is store-wide: every append,
/// whatever its tenant, waits for the one before it. Only
/// `PostgresMovementLedger` lets tenants append concurrently (it serializes
/// per tenant, not per store).
#[derive(Debug, Default)]
pub struct InMemoryMovementLedger {
    inner: RwLock<Inner>,
}

impl InMemoryMovementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> LedgerError {
        LedgerError::Unavailable("lock poisoned".to_string())
    }
}

#[async_trait]
impl MovementLedger for InMemoryMovementLedger {
    async fn append(
        &self,
        tenant_id: TenantId,
        movement: NewMovement,
        idempotency_key: Option<String>,
    ) -> Result<AppendOutcome, LedgerError> {
        let (movement, key) = prepare(movement, idempotency_key)?;

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Inner {
            last_position,
            tenants,
        } = &mut *inner;
        let tenant = tenants.entry(tenant_id).or_default();

        if let Some(k) = key.as_deref() {
            if let Some(&idx) = tenant.by_key.get(k) {
                return replay(tenant.rows[idx].clone(), &movement, k);
            }
        }

        *last_position += 1;
        let recorded = StockMovement::record(
            tenant_id,
            MovementId::new(),
            *last_position,
            ledger_precision(Utc::now()),
            key.clone(),
            movement,
        );

        if let Some(k) = key {
            tenant.by_key.insert(k, tenant.rows.len());
        }
        tenant.rows.push(recorded.clone());

        Ok(AppendOutcome {
            movement: recorded,
            replayed: false,
        })
    }

    async fn query(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let Some(tenant) = inner.tenants.get(&tenant_id) else {
            return Ok(MovementPage::new(vec![], 0, pagination));
        };

        let matching: Vec<&StockMovement> = if filter.newest_first {
            tenant.rows.iter().rev().filter(|m| filter.matches(m)).collect()
        } else {
            tenant.rows.iter().filter(|m| filter.matches(m)).collect()
        };

        let total = matching.len() as u64;
        let movements = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(MovementPage::new(movements, total, pagination))
    }

    async fn read_after(
        &self,
        tenant_id: TenantId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let Some(tenant) = inner.tenants.get(&tenant_id) else {
            return Ok(vec![]);
        };

        let start = tenant.rows.partition_point(|m| m.position <= after);
        Ok(tenant.rows[start..].iter().take(limit).cloned().collect())
    }

    async fn head_position(&self, tenant_id: TenantId) -> Result<u64, LedgerError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .tenants
            .get(&tenant_id)
            .and_then(|t| t.rows.last())
            .map(|m| m.position)
            .unwrap_or(0))
    }
}
