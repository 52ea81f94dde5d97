use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use posledger_core::{TenantId, UserId};

use crate::app::errors::json_error;
use crate::context::{TenantContext, UserContext};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Resolve the caller's tenant (and user, when given) from request headers.
///
/// Every scoped route needs `x-tenant-id`. Mutating routes also need
/// `x-user-id`; reads accept it but do not require it.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let tenant_id: TenantId = match header_value(req.headers(), TENANT_HEADER) {
        Some(raw) => raw.parse().map_err(|_| invalid_header(TENANT_HEADER))?,
        None => return Err(missing_header(TENANT_HEADER)),
    };

    let user_id: Option<UserId> = header_value(req.headers(), USER_HEADER)
        .map(|raw| raw.parse().map_err(|_| invalid_header(USER_HEADER)))
        .transpose()?;

    if !req.method().is_safe() && user_id.is_none() {
        return Err(missing_header(USER_HEADER));
    }

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    if let Some(user_id) = user_id {
        req.extensions_mut().insert(UserContext::new(user_id));
    }

    Ok(next.run(req).await)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn missing_header(name: &str) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "missing_header",
        format!("{name} header is required"),
    )
}

fn invalid_header(name: &str) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_header",
        format!("{name} must be a UUID"),
    )
}
