use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use posledger_infra::EngineResult;

use crate::app::errors;

pub mod movements;
pub mod outlets;
pub mod products;
pub mod shifts;
pub mod stock;
pub mod suppliers;
pub mod system;
pub mod tills;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/movements", post(movements::record_movement).get(movements::list_movements))
        .route("/adjustments", get(movements::adjustment_history))
        .route("/stock", get(stock::current_stock))
        .route("/stock/low", get(stock::low_stock))
        .route("/stock/rebuild", post(stock::rebuild_stock))
        .route("/transfers", get(stock::transfers))
        .route("/read-models/rebuild", post(stock::rebuild_read_models))
        .nest("/outlets", outlets::router())
        .nest("/products", products::router())
        .nest("/suppliers", suppliers::router())
        .nest("/tills", tills::router())
        .route("/shift/start", post(shifts::start_shift))
        .route("/shift/close", post(shifts::close_shift))
        .nest("/shifts", shifts::router())
}

/// `status` with the JSON body on success, the mapped engine error otherwise.
pub(crate) fn reply<T: Serialize>(status: StatusCode, result: EngineResult<T>) -> axum::response::Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
