use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use posledger_core::SupplierId;

use crate::app::dto;
use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier))
        .route("/:id/attributions", post(attribute_reference))
}

pub async fn register_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::NameRequest>,
) -> axum::response::Response {
    reply(StatusCode::CREATED, services.scope(&tenant).register_supplier(&body.name))
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    reply(StatusCode::OK, Ok(services.scope(&tenant).suppliers()))
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let supplier_id: SupplierId = match dto::parse_id(&id, "supplier id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).supplier(supplier_id))
}

/// Late attribution: link an existing reference id to this supplier.
pub async fn attribute_reference(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AttributionRequest>,
) -> axum::response::Response {
    let supplier_id: SupplierId = match dto::parse_id(&id, "supplier id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let supplier = services
        .scope(&tenant)
        .attribute_reference(supplier_id, &body.reference_id)
        .await;
    reply(StatusCode::OK, supplier)
}
