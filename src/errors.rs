use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::oauth::OAuthError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid or missing admin key")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("journal {0} is not configured for ORCID")]
    NotConfigured(i64),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn internal(e: &dyn std::fmt::Display) -> (StatusCode, &'static str, &'static str, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal_server_error",
        "internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_admin_key",
                self.to_string(),
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                self.to_string(),
            ),
            AppError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                self.to_string(),
            ),
            AppError::NotConfigured(_) => (
                StatusCode::CONFLICT,
                "configuration_error",
                "orcid_not_configured",
                self.to_string(),
            ),
            AppError::OAuth(e) => match e {
                OAuthError::InvalidToken => (
                    StatusCode::FORBIDDEN,
                    "permission_error",
                    "invalid_email_token",
                    e.to_string(),
                ),
                OAuthError::NotConfigured => (
                    StatusCode::CONFLICT,
                    "configuration_error",
                    "orcid_not_configured",
                    e.to_string(),
                ),
                OAuthError::Transport(_)
                | OAuthError::Rejected { .. }
                | OAuthError::InvalidResponse(_) => (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "authorization_failed",
                    e.to_string(),
                ),
                OAuthError::Store(inner) => internal(inner),
            },
            AppError::Sync(e) => match e {
                SyncError::Transport(_) => (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "registry_unreachable",
                    e.to_string(),
                ),
                SyncError::Store(_) | SyncError::Build(_) => internal(e),
            },
            AppError::Database(e) => internal(e),
            AppError::Internal(e) => internal(e),
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::OAuth(OAuthError::InvalidToken).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::OAuth(OAuthError::Rejected { status: 400, body: String::new() })
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
