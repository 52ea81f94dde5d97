use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be deleted and rebuilt from the
/// stream at any time, and a rebuilt model must equal the incrementally
/// maintained one. That equality is what makes a materialized view safe to
/// serve.
///
/// ## Idempotency
///
/// `apply` may see the same envelope twice under at-least-once delivery.
/// `ProjectionRunner` guards against that by tracking the last sequence number
/// per tenant; projections driven by other means must guard themselves.
///
/// ## Tenant isolation
///
/// The envelope carries `tenant_id`; a projection must only ever update state
/// for that tenant.
///
/// ## Errors
///
/// `apply` does not fail. Data that looks wrong from a business point of view
/// (negative stock, an unmatched transfer) is state to report, not an error.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
