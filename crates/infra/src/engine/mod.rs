//! Engine façade.
//!
//! `Engine` owns the stores and read models; every operation goes through a
//! `TenantScope` obtained with `engine.tenant(tenant_id)`. No scope method
//! takes a tenant parameter, so a caller cannot read or write across tenants.
//!
//! ```text
//! registry / till command ─► CommandDispatcher ─► EventStore (CAS per stream)
//!                                   │
//!                                   └─► AggregateProjection / ShiftsProjection
//!
//! movement ─► reference checks ─► MovementLedger ─► StockLevelsProjection::catch_up
//! ```

mod registry;
mod stock;
mod tills;
pub mod views;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use posledger_core::{Aggregate, AggregateId, Conflict, DomainError, OutletId, TenantId};
use posledger_events::{Event, EventBus, InMemoryEventBus, Subscription, TenantScoped};
use posledger_inventory::{CatalogProduct, Outlet, Supplier};
use posledger_tills::{ShiftSummary, Till};

use crate::command_dispatcher::{CommandDispatcher, Dispatched};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::ledger::{InMemoryMovementLedger, MovementLedger, Pagination};
use crate::projections::{
    AggregateProjection, ShiftsProjection, StockLevelsProjection, TransferReconciler,
};
use crate::read_model::TenantStore;

pub use views::{
    HistoryEntry, HistoryPage, LowStockItem, LowStockReport, OutletView, ProductView,
    RebuildReport, StockView, SupplierView, TillView,
};

pub(crate) const OUTLET_STREAM: &str = "outlet";
pub(crate) const PRODUCT_STREAM: &str = "catalog.product";
pub(crate) const SUPPLIER_STREAM: &str = "supplier";
pub(crate) const TILL_STREAM: &str = "till";

pub struct Engine {
    config: EngineConfig,
    dispatcher: CommandDispatcher<Arc<dyn EventStore>>,
    ledger: Arc<dyn MovementLedger>,
    outlets: AggregateProjection<Outlet>,
    products: AggregateProjection<CatalogProduct>,
    suppliers: AggregateProjection<Supplier>,
    tills: AggregateProjection<Till>,
    shifts: ShiftsProjection,
    stock: StockLevelsProjection,
    transfers: TransferReconciler,
    summaries: InMemoryEventBus<ShiftSummary>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn EventStore>,
        ledger: Arc<dyn MovementLedger>,
    ) -> Self {
        let transfers =
            TransferReconciler::new(config.transfer_matching.matcher(), config.max_page_size);
        Self {
            dispatcher: CommandDispatcher::new(store),
            ledger,
            outlets: AggregateProjection::in_memory(),
            products: AggregateProjection::in_memory(),
            suppliers: AggregateProjection::in_memory(),
            tills: AggregateProjection::in_memory(),
            shifts: ShiftsProjection::new(),
            stock: StockLevelsProjection::new(),
            transfers,
            summaries: InMemoryEventBus::new(),
            config,
        }
    }

    /// Everything in memory (dev and tests).
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryMovementLedger::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transfer_strategy(&self) -> &'static str {
        self.transfers.strategy()
    }

    /// The only way into tenant data.
    pub fn tenant(&self, tenant_id: TenantId) -> TenantScope<'_> {
        TenantScope {
            engine: self,
            tenant_id,
        }
    }
}

/// Operations and queries bound to one tenant.
#[derive(Clone, Copy)]
pub struct TenantScope<'a> {
    engine: &'a Engine,
    tenant_id: TenantId,
}

impl TenantScope<'_> {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn pagination(&self, limit: Option<u32>, offset: Option<u32>) -> Pagination {
        let config = &self.engine.config;
        Pagination::bounded(limit, offset, config.default_page_size, config.max_page_size)
    }

    /// Run a command against one aggregate stream and record the new state.
    fn execute<A, S>(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        command: &A::Command,
        projection: &AggregateProjection<A, S>,
        make: impl Fn(AggregateId) -> A,
    ) -> EngineResult<Dispatched<A>>
    where
        A: Aggregate<Error = DomainError> + Clone,
        A::Event: Event + Serialize + DeserializeOwned,
        S: TenantStore<A::Id, A>,
    {
        let dispatched = self
            .engine
            .dispatcher
            .dispatch_with_retry(
                self.tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                self.engine.config.conflict_retries,
                |_, id| make(id),
            )
            .inspect_err(|e| {
                tracing::warn!(
                    tenant_id = %self.tenant_id,
                    aggregate_type,
                    aggregate_id = %aggregate_id,
                    error = %e,
                    "command rejected"
                )
            })?;

        if !dispatched.events.is_empty() {
            projection.observe(self.tenant_id, &dispatched.aggregate);
        }
        Ok(dispatched)
    }

    /// An outlet that exists and accepts new activity.
    fn active_outlet(&self, outlet_id: OutletId) -> EngineResult<Outlet> {
        let outlet = self
            .engine
            .outlets
            .get(self.tenant_id, &outlet_id)
            .ok_or_else(|| EngineError::not_found(format!("outlet {outlet_id}")))?;
        if !outlet.is_active() {
            return Err(Conflict::OutletInactive.into());
        }
        Ok(outlet)
    }

    /// Subscribe to closed-shift summaries of this tenant.
    pub fn subscribe_summaries(&self) -> ShiftSummaryFeed {
        ShiftSummaryFeed {
            tenant_id: self.tenant_id,
            subscription: self.engine.summaries.subscribe(),
        }
    }
}

/// Closed-shift summaries for one tenant; other tenants' summaries are dropped.
#[derive(Debug)]
pub struct ShiftSummaryFeed {
    tenant_id: TenantId,
    subscription: Subscription<ShiftSummary>,
}

/// Why a feed produced nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Closed,
}

impl ShiftSummaryFeed {
    /// Wait up to `timeout` for the next summary of this tenant.
    pub fn next_timeout(&self, timeout: Duration) -> Result<ShiftSummary, FeedStatus> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.subscription.recv_timeout(remaining) {
                Ok(summary) if summary.tenant_id() == self.tenant_id => return Ok(summary),
                Ok(_) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => return Err(FeedStatus::Idle),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(FeedStatus::Closed);
                }
            }
        }
    }
}
