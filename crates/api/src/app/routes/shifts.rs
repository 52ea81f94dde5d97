use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::sse::Event as SseEvent,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use posledger_core::ShiftId;

use crate::app::dto;
use crate::app::routes::reply;
use crate::app::services::{self, AppServices};
use crate::context::{TenantContext, UserContext};

/// `/shifts/...`; start and close live under `/shift`.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list_shifts))
        .route("/summaries/stream", get(summary_stream))
        .route("/:id", get(get_shift))
        .route("/:id/cash-sales", post(record_cash_sale))
        .route("/:id/cash-refunds", post(record_cash_refund))
}

fn shift_id(raw: &str) -> Result<ShiftId, axum::response::Response> {
    dto::parse_id(raw, "shift id")
}

pub async fn start_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<dto::StartShiftRequest>,
) -> axum::response::Response {
    let operating_date = body
        .operating_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let shift = services.scope(&tenant).start_shift(
        body.till_id,
        body.outlet_id,
        user.user_id(),
        operating_date,
        body.opening_cash,
        body.float,
    );
    reply(StatusCode::CREATED, shift)
}

/// Close a running shift; the body carries the reconciled drawer.
pub async fn close_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<dto::CloseShiftRequest>,
) -> axum::response::Response {
    let shift = services.scope(&tenant).close_shift(
        body.shift_id,
        body.closing_cash,
        body.notes,
        user.user_id(),
    );
    reply(StatusCode::OK, shift)
}

pub async fn record_cash_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CashRequest>,
) -> axum::response::Response {
    let shift_id = match shift_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let shift = services
        .scope(&tenant)
        .record_cash_sale(shift_id, body.amount, user.user_id());
    reply(StatusCode::OK, shift)
}

pub async fn record_cash_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CashRequest>,
) -> axum::response::Response {
    let shift_id = match shift_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let shift = services
        .scope(&tenant)
        .record_cash_refund(shift_id, body.amount, user.user_id());
    reply(StatusCode::OK, shift)
}

pub async fn get_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let shift_id = match shift_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).shift(shift_id))
}

pub async fn list_shifts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ShiftsQuery>,
) -> axum::response::Response {
    let filters = dto::parse_opt_id(query.outlet.as_deref(), "outlet")
        .and_then(|outlet| query.status().map(|status| (outlet, status)));
    let (outlet_id, status) = match filters {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, Ok(services.scope(&tenant).shifts(outlet_id, status)))
}

pub async fn summary_stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::shift_summary_stream(services, tenant.tenant_id())
}
