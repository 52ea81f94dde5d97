use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{TenantContext, UserContext};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Append a movement. A retried key answers 200 with the original row.
pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    headers: HeaderMap,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let header_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let (movement, body_key) = body.into_movement(user.user_id());
    let key = header_key.or(body_key);

    match services.scope(&tenant).record_movement(movement, key).await {
        Ok(outcome) => {
            let status = if outcome.replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::MovementsQuery>,
) -> axum::response::Response {
    let filter = match query.filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let page = services
        .scope(&tenant)
        .movements(&filter, query.limit, query.offset)
        .await;
    reply(StatusCode::OK, page)
}

pub async fn adjustment_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let outlet_id = match dto::parse_opt_id(query.outlet.as_deref(), "outlet") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let page = services
        .scope(&tenant)
        .adjustment_history(outlet_id, query.limit, query.offset)
        .await;
    reply(StatusCode::OK, page)
}
