//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append to store with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Return committed events and the post-command aggregate state
//! ```
//!
//! Step 4 is the compare-and-swap that makes check-then-act decisions safe
//! (a till accepts one shift start at a time). A lost race surfaces as
//! `DispatchError::Concurrency`; `dispatch_with_retry` reloads and decides
//! again, so the loser sees the winner's state and gets a business error
//! (e.g. `Conflict::TillInUse`) instead of a version error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use posledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (the stream moved since it was loaded).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the decided events were applied.
    pub aggregate: A,
    /// Typed events, in commit order. Empty when the command was a no-op.
    pub events: Vec<A::Event>,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Aggregates used here must be deterministic and side-effect free, and must
/// bump their version once per applied event.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load and rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command once. A concurrent writer yields `Concurrency`.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: posledger_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (tenant-scoped)
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events: vec![],
                committed: vec![],
            });
        }

        // 4) Persist (append-only, compare-and-swap on the stream version)
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Evolve the in-memory copy to match what was stored
        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
        })
    }

    /// Dispatch, reloading and re-deciding up to `retries` times on a lost race.
    pub fn dispatch_with_retry<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        retries: u32,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: posledger_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            match self.dispatch(tenant_id, aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) if attempt < retries => {
                    attempt += 1;
                    debug!(
                        tenant_id = %tenant_id,
                        aggregate_id = %aggregate_id,
                        attempt,
                        reason = %msg,
                        "stream moved during dispatch, retrying"
                    );
                }
                other => return other,
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use posledger_core::{AggregateRoot, Conflict, OutletId};
    use posledger_inventory::{Outlet, OutletCommand};

    use crate::event_store::InMemoryEventStore;

    fn register(tenant_id: TenantId, outlet_id: OutletId) -> OutletCommand {
        OutletCommand::Register {
            tenant_id,
            outlet_id,
            name: "Main Street".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn dispatch_persists_and_returns_new_state() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let (tenant, outlet) = (TenantId::new(), OutletId::new());

        let out = dispatcher
            .dispatch(tenant, outlet.as_aggregate(), "outlet", &register(tenant, outlet), |_, _| {
                Outlet::empty(outlet)
            })
            .unwrap();

        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.aggregate.version(), 1);
        assert!(out.aggregate.is_active());

        let loaded = dispatcher
            .load(tenant, outlet.as_aggregate(), |_, _| Outlet::empty(outlet))
            .unwrap();
        assert_eq!(loaded, out.aggregate);
    }

    #[test]
    fn domain_rejection_is_not_persisted() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let (tenant, outlet) = (TenantId::new(), OutletId::new());
        let make = |_, _| Outlet::empty(outlet);

        dispatcher
            .dispatch(tenant, outlet.as_aggregate(), "outlet", &register(tenant, outlet), make)
            .unwrap();
        let err = dispatcher
            .dispatch(tenant, outlet.as_aggregate(), "outlet", &register(tenant, outlet), make)
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::Conflict(Conflict::AlreadyExists(_)))
        ));
        assert_eq!(
            dispatcher.store().load_stream(tenant, outlet.as_aggregate()).unwrap().len(),
            1
        );
    }

    #[test]
    fn other_tenants_do_not_see_the_stream() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let (tenant, outlet) = (TenantId::new(), OutletId::new());

        dispatcher
            .dispatch(tenant, outlet.as_aggregate(), "outlet", &register(tenant, outlet), |_, _| {
                Outlet::empty(outlet)
            })
            .unwrap();

        let other = dispatcher
            .load(TenantId::new(), outlet.as_aggregate(), |_, _| Outlet::empty(outlet))
            .unwrap();
        assert!(!other.is_created());
    }
}
