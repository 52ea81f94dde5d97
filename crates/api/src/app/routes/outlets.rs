use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use posledger_core::OutletId;

use crate::app::dto;
use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_outlet).get(list_outlets))
        .route("/:id", get(get_outlet))
        .route("/:id/rename", post(rename_outlet))
        .route("/:id/deactivate", post(deactivate_outlet))
        .route("/:id/reactivate", post(reactivate_outlet))
}

pub async fn register_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::NameRequest>,
) -> axum::response::Response {
    reply(StatusCode::CREATED, services.scope(&tenant).register_outlet(&body.name))
}

pub async fn list_outlets(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    reply(StatusCode::OK, Ok(services.scope(&tenant).outlets()))
}

pub async fn get_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let outlet_id: OutletId = match dto::parse_id(&id, "outlet id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).outlet(outlet_id))
}

pub async fn rename_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::NameRequest>,
) -> axum::response::Response {
    let outlet_id: OutletId = match dto::parse_id(&id, "outlet id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).rename_outlet(outlet_id, &body.name))
}

pub async fn deactivate_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let outlet_id: OutletId = match dto::parse_id(&id, "outlet id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).deactivate_outlet(outlet_id))
}

pub async fn reactivate_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let outlet_id: OutletId = match dto::parse_id(&id, "outlet id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).reactivate_outlet(outlet_id))
}
