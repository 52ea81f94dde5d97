use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
};
use serde_json::json;

use crate::app::dto;
use crate::app::routes::reply;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub async fn current_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::StockQuery>,
) -> axum::response::Response {
    let (outlet_id, product_id, variation_id) = match query.ids() {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let view = services
        .scope(&tenant)
        .current_stock(outlet_id, product_id, variation_id)
        .await;
    reply(StatusCode::OK, view)
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::OutletQuery>,
) -> axum::response::Response {
    let outlet_id = match dto::parse_opt_id(query.outlet.as_deref(), "outlet") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).low_stock(outlet_id).await)
}

pub async fn transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::OutletQuery>,
) -> axum::response::Response {
    let outlet_id = match dto::parse_opt_id(query.outlet.as_deref(), "outlet") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    reply(StatusCode::OK, services.scope(&tenant).transfers(outlet_id).await)
}

pub async fn rebuild_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let watermark = services.scope(&tenant).rebuild_stock().await;
    reply(StatusCode::OK, watermark.map(|w| json!({ "watermark": w })))
}

pub async fn rebuild_read_models(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    reply(StatusCode::OK, services.scope(&tenant).rebuild_read_models().await)
}
