//! HTTP application wiring (Axum router + shared services).
//!
//! - `services.rs`: the engine handle shared by every handler, and the SSE bridge
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs, query strings and id parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use posledger_infra::Engine;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(engine: Arc<Engine>) -> Router {
    let services = Arc::new(services::AppServices::new(engine));

    // Scoped routes: require tenant (and, for writes, user) headers.
    let scoped = routes::router().layer(axum::middleware::from_fn(middleware::context_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/info", get(routes::system::info))
        .merge(scoped)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
