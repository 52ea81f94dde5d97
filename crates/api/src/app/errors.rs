use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use posledger_infra::EngineError;

/// Map an engine failure onto the HTTP error contract.
///
/// Conflicts carry their own code (`till_in_use`, ...). Transient failures
/// are flagged `retryable` so clients may resend with the same idempotency key.
pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let code = err.code();
    match err {
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        EngineError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, code, format!("{what} not found"))
        }
        EngineError::Conflict(c) => json_error(StatusCode::CONFLICT, code, c.to_string()),
        EngineError::Transient(msg) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "error": code,
                "message": msg,
                "retryable": true,
            })),
        )
            .into_response(),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
