//! `TrustError` to HTTP response mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::TrustError;

/// Error body: stable reason code, the entity it concerns, readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub key: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub TrustError);

impl From<TrustError> for ApiError {
    fn from(e: TrustError) -> Self {
        Self(e)
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn status_for(e: &TrustError) -> StatusCode {
    match e {
        TrustError::NotFound { .. } => StatusCode::NOT_FOUND,
        TrustError::DuplicateEvent { .. }
        | TrustError::StaleWrite { .. }
        | TrustError::AlreadyMinted { .. }
        | TrustError::AlreadyVoted { .. }
        | TrustError::VotingClosed { .. }
        | TrustError::VotingStillOpen { .. }
        | TrustError::AlreadyExecuted { .. }
        | TrustError::AlreadyConfirmed { .. }
        | TrustError::InvalidTransition { .. } => StatusCode::CONFLICT,
        TrustError::VerificationFailed { .. }
        | TrustError::SignatureInvalid { .. }
        | TrustError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TrustError::ChainUnavailable { .. } | TrustError::VerificationUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TrustError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match &self.0 {
            TrustError::Storage(detail) => {
                // Driver detail stays in the logs
                error!(error = %detail, "Storage failure");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.0.code(),
            key: self.0.entity_key(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TrustError::not_found("proposal", "7")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&TrustError::AlreadyVoted {
                proposal_id: 7,
                voter: "0x1".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&TrustError::invalid_input("0xzz", "bad address")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&TrustError::chain_unavailable("0x1", "timeout")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_storage_detail_is_not_exposed() {
        let response = ApiError(TrustError::Storage("password=hunter2".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
