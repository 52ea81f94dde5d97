use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use posledger_core::TenantId;
use posledger_infra::{Engine, FeedStatus, TenantScope};
use posledger_tills::ShiftSummary;

use crate::context::TenantContext;

/// How long the feed bridge blocks before checking whether the client left.
const FEED_POLL: Duration = Duration::from_secs(1);
const SUMMARY_BUFFER: usize = 64;
const SHIFT_CLOSED_EVENT: &str = "shift.closed";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppServices {
    engine: Arc<Engine>,
}

impl AppServices {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn scope(&self, tenant: &TenantContext) -> TenantScope<'_> {
        self.engine.tenant(tenant.tenant_id())
    }
}

/// SSE stream of closed-shift summaries for one tenant.
///
/// The engine's feed is blocking, so a blocking task pumps it into a channel
/// and stops once the client has gone away or the bus is closed.
pub fn shift_summary_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let feed = services.engine().tenant(tenant_id).subscribe_summaries();
    let (tx, rx) = mpsc::channel::<ShiftSummary>(SUMMARY_BUFFER);

    tokio::task::spawn_blocking(move || {
        loop {
            match feed.next_timeout(FEED_POLL) {
                Ok(summary) => {
                    if tx.blocking_send(summary).is_err() {
                        break;
                    }
                }
                Err(FeedStatus::Idle) if tx.is_closed() => break,
                Err(FeedStatus::Idle) => {}
                Err(FeedStatus::Closed) => break,
            }
        }
        debug!(%tenant_id, "shift summary stream ended");
    });

    let stream = ReceiverStream::new(rx)
        .filter_map(|summary| sse_event(SHIFT_CLOSED_EVENT, &summary))
        .map(Ok::<_, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Encode one SSE event; a payload that cannot be serialized is logged and dropped.
fn sse_event<T: Serialize>(name: &'static str, payload: &T) -> Option<SseEvent> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(SseEvent::default().event(name).data(data)),
        Err(e) => {
            warn!(event = name, error = %e, "dropping unserializable event");
            None
        }
    }
}
