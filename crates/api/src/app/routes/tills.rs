use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use posledger_core::TillId;

use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_till).get(list_tills))
        .route("/:id", get(get_till).delete(retire_till))
        .route("/:id/rename", post(rename_till))
        .route("/:id/reassign", post(reassign_till))
        .route("/:id/deactivate", post(deactivate_till))
        .route("/:id/reactivate", post(reactivate_till))
}

fn till_id(raw: &str) -> Result<TillId, axum::response::Response> {
    dto::parse_id(raw, "till id")
}

pub async fn register_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterTillRequest>,
) -> axum::response::Response {
    let till = services.scope(&tenant).register_till(body.outlet_id, &body.name);
    reply(StatusCode::CREATED, till)
}

/// Tills with their in-use flag; `?outlet=` narrows to one outlet.
pub async fn list_tills(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::OutletQuery>,
) -> axum::response::Response {
    let outlet_id = match dto::parse_opt_id(query.outlet.as_deref(), "outlet") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, Ok(services.scope(&tenant).tills(outlet_id)))
}

pub async fn get_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).till(till_id))
}

pub async fn rename_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::NameRequest>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).rename_till(till_id, &body.name))
}

pub async fn reassign_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReassignTillRequest>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(
        StatusCode::OK,
        services.scope(&tenant).reassign_till(till_id, body.outlet_id),
    )
}

pub async fn deactivate_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).deactivate_till(till_id))
}

pub async fn reactivate_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).reactivate_till(till_id))
}

pub async fn retire_till(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let till_id = match till_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.scope(&tenant).retire_till(till_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
