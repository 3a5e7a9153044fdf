use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failure kinds surfaced by the chat core.
///
/// None of these are retried internally; callers decide whether to retry
/// after correcting their input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// The record is not in the status the requested transition needs.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller lacks membership or admin rights.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("an account cannot target itself")]
    SelfReference,

    /// Blocked, duplicate pending request, already friends, duplicate key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Opaque collaborator I/O failure (database, filesystem).
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Boundary only: no acting account could be resolved for the request.
    #[error("authentication required")]
    Unauthenticated,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::SelfReference => "SELF_REFERENCE",
            Error::Conflict(_) => "CONFLICT",
            Error::StorageFailure(_) => "STORAGE_FAILURE",
            Error::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::SelfReference => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::StorageFailure(detail) => {
                error!("[Http] storage failure: {}", detail);
                "internal storage error".to_string()
            }
            other => {
                warn!("[Http] request rejected ({}): {}", other.code(), other);
                other.to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row".to_string()),
            other => Error::StorageFailure(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_stable_codes() {
        assert_eq!(Error::SelfReference.code(), "SELF_REFERENCE");
        assert_eq!(Error::SelfReference.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::not_found("group").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::InvalidState("x".into()).code(), "INVALID_STATE");
    }

    #[test]
    fn test_storage_failure_is_opaque_to_clients() {
        let response = Error::StorageFailure("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_io_error_becomes_storage_failure() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert_eq!(err.code(), "STORAGE_FAILURE");
    }
}
