use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use posledger_core::ProductId;
use posledger_inventory::SettingsTarget;

use crate::app::dto;
use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/variations", post(add_variation))
        .route("/:id/stock-settings", post(change_stock_settings))
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterProductRequest>,
) -> axum::response::Response {
    let product = services
        .scope(&tenant)
        .register_product(&body.name, body.sku, body.settings);
    reply(StatusCode::CREATED, product)
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    reply(StatusCode::OK, Ok(services.scope(&tenant).products()))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&id, "product id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).product(product_id))
}

pub async fn add_variation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddVariationRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&id, "product id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let added = services
        .scope(&tenant)
        .add_variation(product_id, &body.name, body.sku, body.settings)
        .map(|(variation_id, product)| {
            json!({
                "variation_id": variation_id,
                "product": product,
            })
        });
    reply(StatusCode::CREATED, added)
}

pub async fn change_stock_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockSettingsRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&id, "product id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let target = match body.variation_id {
        Some(variation_id) => SettingsTarget::Variation(variation_id),
        None => SettingsTarget::Product,
    };
    let product = services
        .scope(&tenant)
        .change_stock_settings(product_id, target, body.settings());
    reply(StatusCode::OK, product)
}
