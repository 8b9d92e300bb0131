//! Admin gate for the management routes.
//!
//! Every request under `/api/admin` must present the master key, either
//! in the `x-admin-key` header or an `adminKey` cookie. The comparison
//! goes through a SHA-256 digest of both sides so the check does not
//! leak token length or short-circuit on the first differing byte.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, middleware::cookie_value, services::auth_service, AppState};

pub async fn admin_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let presented = headers
        .get("x-admin-key")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| cookie_value(headers, "adminKey"))
        .ok_or(AppError::AdminOnly)?;

    if !auth_service::is_admin_token(&presented, &state.config.admin_key) {
        return Err(AppError::AdminOnly);
    }

    Ok(next.run(request).await)
}
