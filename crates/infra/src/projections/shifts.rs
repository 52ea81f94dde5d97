use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use posledger_core::{ShiftId, TenantId, TillId};
use posledger_tills::{Shift, TillEvent};

use crate::event_store::{EventStore, StoredEvent};
use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::ProjectionFailure;

/// Shift history (running and completed), folded from till streams.
///
/// Cursor is the last applied sequence number per till stream; events at or
/// below it are replays and are skipped. Concurrent commands can hand their
/// events over out of commit order, so an event that is not the cursor's
/// direct successor triggers a catch-up from the till's stream instead of
/// being folded on its own.
#[derive(Debug, Default)]
pub struct ShiftsProjection {
    shifts: InMemoryTenantStore<ShiftId, Shift>,
    cursors: Mutex<HashMap<(TenantId, TillId), u64>>,
}

impl ShiftsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, shift_id: ShiftId) -> Option<Shift> {
        self.shifts.get(tenant_id, &shift_id)
    }

    /// Every shift of the tenant, newest first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<Shift> {
        let mut shifts = self.shifts.list(tenant_id);
        shifts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        shifts
    }

    /// Apply committed till events (sequence numbers paired with typed events).
    pub fn apply(
        &self,
        tenant_id: TenantId,
        store: &dyn EventStore,
        committed: &[StoredEvent],
        events: &[TillEvent],
    ) -> Result<(), ProjectionFailure> {
        let mut cursors = self.cursors.lock().map_err(|_| ProjectionFailure::Poisoned)?;

        for (stored, event) in committed.iter().zip(events) {
            if stored.tenant_id != tenant_id {
                return Err(ProjectionFailure::TenantIsolation(format!(
                    "event {} belongs to another tenant",
                    stored.event_id
                )));
            }
            let cursor = cursors.entry((tenant_id, event.till_id())).or_insert(0);
            if stored.sequence_number <= *cursor {
                continue;
            }
            if stored.sequence_number == *cursor + 1 {
                fold_into(&self.shifts, tenant_id, event);
                *cursor = stored.sequence_number;
            } else {
                *cursor = self.catch_up(tenant_id, store, stored, *cursor)?;
            }
        }
        Ok(())
    }

    /// Fold the till stream from just after `cursor`; returns the new cursor.
    fn catch_up(
        &self,
        tenant_id: TenantId,
        store: &dyn EventStore,
        gap_at: &StoredEvent,
        cursor: u64,
    ) -> Result<u64, ProjectionFailure> {
        let stream = store.load_stream(tenant_id, gap_at.aggregate_id)?;
        let mut applied = cursor;
        for stored in stream.iter().filter(|e| e.sequence_number > cursor) {
            let event: TillEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ProjectionFailure::Deserialize(e.to_string()))?;
            fold_into(&self.shifts, tenant_id, &event);
            applied = stored.sequence_number;
        }
        debug!(
            aggregate_id = %gap_at.aggregate_id,
            from = cursor,
            to = applied,
            "shift view caught up from till stream"
        );
        Ok(applied)
    }

    /// Refold the tenant's shifts from every stored till event.
    pub fn rebuild(&self, tenant_id: TenantId, events: &[StoredEvent]) -> Result<usize, ProjectionFailure> {
        let scratch: InMemoryTenantStore<ShiftId, Shift> = InMemoryTenantStore::new();
        let mut cursors: HashMap<TillId, u64> = HashMap::new();

        for stored in events {
            if stored.tenant_id != tenant_id {
                return Err(ProjectionFailure::TenantIsolation(format!(
                    "event {} belongs to another tenant",
                    stored.event_id
                )));
            }
            let event: TillEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ProjectionFailure::Deserialize(e.to_string()))?;
            fold_into(&scratch, tenant_id, &event);
            cursors.insert(event.till_id(), stored.sequence_number);
        }

        let rebuilt = scratch.list(tenant_id);
        let count = rebuilt.len();

        let mut held = self.cursors.lock().map_err(|_| ProjectionFailure::Poisoned)?;
        held.retain(|(t, _), _| *t != tenant_id);
        held.extend(cursors.into_iter().map(|(till, seq)| ((tenant_id, till), seq)));
        self.shifts.replace_tenant(
            tenant_id,
            rebuilt.into_iter().map(|s| (s.shift_id, s)).collect(),
        );
        Ok(count)
    }
}

fn fold_into(store: &InMemoryTenantStore<ShiftId, Shift>, tenant_id: TenantId, event: &TillEvent) {
    match event {
        TillEvent::ShiftStarted(e) => store.upsert(tenant_id, e.shift_id, Shift::started(e)),
        other => {
            let Some(shift_id) = other.shift_id() else {
                return;
            };
            if let Some(mut shift) = store.get(tenant_id, &shift_id) {
                other.apply_to_shift(&mut shift);
                store.upsert(tenant_id, shift_id, shift);
            }
        }
    }
}
