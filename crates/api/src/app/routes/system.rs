use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Unauthenticated build/runtime facts.
pub async fn info(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let config = services.engine().config();
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "transfer_matching": services.engine().transfer_strategy(),
        "default_page_size": config.default_page_size,
        "max_page_size": config.max_page_size,
    }))
}
