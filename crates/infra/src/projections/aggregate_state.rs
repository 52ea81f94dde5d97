use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;

use serde::de::DeserializeOwned;

use posledger_core::{Aggregate, AggregateId, AggregateRoot, TenantId};

use crate::event_store::StoredEvent;
use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::ProjectionFailure;

/// Read model holding the latest folded state of every aggregate of one type.
///
/// Fed with post-command aggregate state from the dispatcher; the aggregate
/// version is the cursor, so a stale or repeated observation is ignored.
pub struct AggregateProjection<A, S = InMemoryTenantStore<<A as AggregateRoot>::Id, A>>
where
    A: Aggregate,
{
    store: S,
    write: Mutex<()>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> AggregateProjection<A>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Id: Send + Sync + 'static,
{
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<A, S> AggregateProjection<A, S>
where
    A: Aggregate + Clone,
    S: TenantStore<A::Id, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            write: Mutex::new(()),
            _aggregate: PhantomData,
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: &A::Id) -> Option<A> {
        self.store.get(tenant_id, id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    /// Record aggregate state if it is newer than what is held.
    pub fn observe(&self, tenant_id: TenantId, aggregate: &A) {
        let Ok(_guard) = self.write.lock() else {
            return;
        };
        let id = aggregate.id().clone();
        let newer = self
            .store
            .get(tenant_id, &id)
            .is_none_or(|held| held.version() < aggregate.version());
        if newer {
            self.store.upsert(tenant_id, id, aggregate.clone());
        }
    }

    /// Refold every stream of the tenant from stored events and swap the result in.
    pub fn rebuild(
        &self,
        tenant_id: TenantId,
        events: &[StoredEvent],
        make: impl Fn(AggregateId) -> A,
    ) -> Result<usize, ProjectionFailure>
    where
        A::Event: DeserializeOwned,
    {
        let mut folded: HashMap<AggregateId, A> = HashMap::new();
        for stored in events {
            if stored.tenant_id != tenant_id {
                return Err(ProjectionFailure::TenantIsolation(format!(
                    "event {} belongs to another tenant",
                    stored.event_id
                )));
            }
            let event: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ProjectionFailure::Deserialize(e.to_string()))?;
            folded
                .entry(stored.aggregate_id)
                .or_insert_with(|| make(stored.aggregate_id))
                .apply(&event);
        }

        let count = folded.len();
        let entries = folded
            .into_values()
            .map(|a| (a.id().clone(), a))
            .collect();

        let Ok(_guard) = self.write.lock() else {
            return Err(ProjectionFailure::Poisoned);
        };
        self.store.replace_tenant(tenant_id, entries);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use posledger_core::OutletId;
    use posledger_inventory::{Outlet, OutletCommand};
    use uuid::Uuid;

    use crate::event_store::UncommittedEvent;

    fn registered(tenant_id: TenantId, outlet_id: OutletId) -> Outlet {
        let mut outlet = Outlet::empty(outlet_id);
        for e in outlet
            .handle(&OutletCommand::Register {
                tenant_id,
                outlet_id,
                name: "Harbour".to_string(),
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            outlet.apply(&e);
        }
        outlet
    }

    #[test]
    fn stale_state_does_not_overwrite_newer() {
        let projection: AggregateProjection<Outlet> = AggregateProjection::in_memory();
        let (tenant, id) = (TenantId::new(), OutletId::new());
        let v1 = registered(tenant, id);

        let mut v2 = v1.clone();
        for e in v2
            .handle(&OutletCommand::Deactivate {
                tenant_id: tenant,
                outlet_id: id,
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            v2.apply(&e);
        }

        projection.observe(tenant, &v2);
        projection.observe(tenant, &v1);

        let held = projection.get(tenant, &id).unwrap();
        assert_eq!(held.version(), 2);
        assert!(!held.is_active());
        assert!(projection.get(TenantId::new(), &id).is_none());
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let projection: AggregateProjection<Outlet> = AggregateProjection::in_memory();
        let (tenant, id) = (TenantId::new(), OutletId::new());

        let decided = Outlet::empty(id)
            .handle(&OutletCommand::Register {
                tenant_id: tenant,
                outlet_id: id,
                name: "Harbour".to_string(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        let mut incremental = Outlet::empty(id);
        incremental.apply(&decided[0]);
        projection.observe(tenant, &incremental);

        let u = UncommittedEvent::from_typed(
            tenant,
            id.as_aggregate(),
            "outlet",
            Uuid::now_v7(),
            &decided[0],
        )
        .unwrap();
        let stored = StoredEvent {
            event_id: u.event_id,
            tenant_id: u.tenant_id,
            aggregate_id: u.aggregate_id,
            aggregate_type: u.aggregate_type,
            sequence_number: 1,
            event_type: u.event_type,
            event_version: u.event_version,
            occurred_at: u.occurred_at,
            recorded_at: Utc::now(),
            payload: u.payload,
        };

        let count = projection
            .rebuild(tenant, &[stored], |agg| {
                Outlet::empty(OutletId::from_uuid(*agg.as_uuid()))
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(projection.get(tenant, &id), Some(incremental));
    }
}
