//! Identity gate for high-value routes
//!
//! Callers name themselves with the `x-user-address` header; the request
//! only reaches the handler when that address holds a verified, unexpired
//! identity session.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{ApiError, ErrorBody};
use crate::error::TrustError;
use crate::identity::IdentitySessionManager;

pub const USER_ADDRESS_HEADER: &str = "x-user-address";

fn unauthorized(code: &'static str, key: Option<String>, message: String) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody { code, key, message }),
    )
        .into_response()
}

/// Identity session middleware
pub async fn require_identity_session(
    State(sessions): State<Arc<IdentitySessionManager>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(address) = headers
        .get(USER_ADDRESS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|a| !a.is_empty())
    else {
        warn!(path = %path, "Missing user address on gated route");
        return unauthorized(
            "identity_required",
            None,
            format!("{} header required", USER_ADDRESS_HEADER),
        );
    };

    match sessions.require_valid_session(address).await {
        Ok(session) => {
            debug!(address = %session.user_address, path = %path, "Identity session accepted");
            next.run(request).await
        }
        Err(e @ (TrustError::NotFound { .. } | TrustError::VerificationFailed { .. })) => {
            warn!(address = %address, path = %path, error = %e, "Identity session required");
            unauthorized(e.code(), e.entity_key(), e.to_string())
        }
        Err(e) => ApiError(e).into_response(),
    }
}
