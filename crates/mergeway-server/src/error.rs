//! Mapping of engine errors onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mergeway_core::{Error, PathConflict};
use serde::Serialize;

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] Error),

    /// The request could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The blocking task running the operation failed.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<&'a [PathConflict]>,
}

impl ApiError {
    /// Status code and machine-readable kind.
    #[must_use]
    pub const fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Engine(err) => match err {
                Error::RepositoryNotFound(_) | Error::PullNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "not_found")
                }
                Error::InvalidReference { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_reference")
                }
                Error::InvalidState { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
                Error::UnrelatedHistories { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "unrelated_histories")
                }
                Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                Error::ConcurrentModification { .. } => {
                    (StatusCode::CONFLICT, "concurrent_modification")
                }
                Error::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
                Error::StateParseError { .. }
                | Error::Config(_)
                | Error::Io(_)
                | Error::Json(_)
                | Error::Toml(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let conflicts = match &self {
            Self::Engine(Error::Conflict(report)) => Some(report.conflicts.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            error: kind,
            message: self.to_string(),
            conflicts,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
