//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor tracking without
//! making storage assumptions.

use posledger_core::TenantId;
use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single tenant.
///
/// `last_sequence_number` doubles as the "last event folded" watermark.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    tenant_id: TenantId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn new(tenant_id: TenantId, last_sequence_number: u64) -> Self {
        Self {
            tenant_id,
            last_sequence_number,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("tenant mismatch (expected {expected}, found {found})")]
    TenantMismatch { expected: TenantId, found: TenantId },

    #[error("non-monotonic sequence (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
///
/// Sequence numbers must strictly increase but may have gaps: the movement
/// ledger numbers positions per store, so one tenant's positions interleave
/// with other tenants'.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific tenant.
    pub fn new_for_tenant(tenant_id: TenantId, projection: P) -> Self {
        Self::resume(ProjectionCursor::new(tenant_id, 0), projection)
    }

    /// Continue a projection from a previously saved cursor.
    pub fn resume(cursor: ProjectionCursor, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(cursor),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor (if any envelopes were applied or the runner is pinned).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing tenant consistency and monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_tenant = envelope.tenant_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor::new(found_tenant, found_seq));
                Ok(())
            }
            Some(mut c) => {
                if c.tenant_id != found_tenant {
                    return Err(ProjectionError::TenantMismatch {
                        expected: c.tenant_id,
                        found: found_tenant,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}
