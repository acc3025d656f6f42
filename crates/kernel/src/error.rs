//! Application error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::listing::ListError;
use crate::scope::ScopeError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

impl From<ListError> for AppError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::UnknownEntity(_) | ListError::NotFound => AppError::NotFound,
            ListError::Invalid(messages) => AppError::BadRequest(messages.join("; ")),
            ListError::Scope(ScopeError::Lookup(e)) | ListError::Storage(e) => {
                AppError::Internal(e)
            }
            ListError::Scope(scope) => AppError::Forbidden(scope.to_string()),
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn list_errors_map_to_statuses() {
        let cases = [
            (ListError::UnknownEntity("widgets".into()), StatusCode::NOT_FOUND),
            (ListError::NotFound, StatusCode::NOT_FOUND),
            (
                ListError::Invalid(vec!["unknown field `salary`".into()]),
                StatusCode::BAD_REQUEST,
            ),
            (
                ListError::Scope(ScopeError::Forbidden {
                    role: Role::Candidate,
                    entity: "users".into(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                ListError::Storage(anyhow::anyhow!("connection reset")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ListError::Scope(ScopeError::Lookup(anyhow::anyhow!("pool timed out"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn storage_failures_do_not_leak_details() {
        let err = AppError::from(ListError::Storage(anyhow::anyhow!(
            "error returned from database: relation \"jobs\" does not exist"
        )));
        assert!(matches!(err, AppError::Internal(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"internal server error");
    }

    #[test]
    fn validation_messages_are_joined() {
        let err = AppError::from(ListError::Invalid(vec!["a".into(), "b".into()]));
        assert_eq!(err.to_string(), "bad request: a; b");
    }
}
