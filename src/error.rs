//! Typed errors and HTTP mapping.
//!
//! `ConfigError` is raised at registration time and is fatal before serving;
//! `ApiError` is the per-request taxonomy the dispatcher translates into a
//! status code and a `{"error": ...}` body. Wire messages are fixed
//! classification phrases; backend detail goes to the log only.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no handler bound for operation '{operation}' required by verb {verb}")]
    MissingHandler {
        verb: crate::routes::Verb,
        operation: crate::handlers::Operation,
    },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("invalid path segment: {0:?}")]
    InvalidPathSegment(String),
    #[error("path segment is reserved: {0}")]
    ReservedPathSegment(String),
    #[error("endpoint '{0}' requires authentication but no authenticator is configured")]
    MissingAuthenticator(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or undecodable request payload. Carries a safe phrase,
    /// never parser output.
    #[error("{0}")]
    Validation(String),
    #[error("Invalid or expired token")]
    Unauthorized,
    #[error("Item not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Conflict with existing item")]
    Conflict,
    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict(detail) => {
                tracing::debug!(%detail, "store rejected write");
                ApiError::Conflict
            }
            StoreError::Backend(detail) => {
                tracing::error!(%detail, "store backend failure");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::Validation("Invalid request body".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn backend_detail_stays_off_the_wire() {
        let err: ApiError = StoreError::Backend("connection refused to 10.0.0.7".into()).into();
        assert_eq!(err.to_string(), "Internal server error");
    }
}
