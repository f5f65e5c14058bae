//! Request-boundary error taxonomy and its mapping onto the response envelope

use crate::hyper::StatusCode;
use crate::query::QueryError;
use crate::relay::RelayError;
use crate::store::StoreError;

/// Every failure a handler can report. The `&'static str` payloads are the
/// user-facing messages; internal causes are logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("storage failure ({message}): {source}")]
    Storage {
        message: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("upstream failure: {0}")]
    Upstream(#[source] RelayError),
    #[error("response parse failure: {0}")]
    Parse(String),
    #[error("internal error ({message}): {detail}")]
    Internal {
        message: &'static str,
        detail: String,
    },
}

impl AppError {
    /// Wrap a store error raised while serving `message`; not-found and
    /// duplicate-name are lifted to their own categories.
    pub fn storage(message: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::NotFound(_) => AppError::NotFound("config not found"),
            StoreError::DuplicateName(_) => AppError::Conflict("config name already exists"),
            other => AppError::Storage {
                message,
                source: other,
            },
        }
    }

    pub fn internal(message: &'static str, detail: impl ToString) -> Self {
        AppError::Internal {
            message,
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Storage { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Upstream(_) | AppError::Parse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable message placed in the envelope
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::BadRequest(m) | AppError::NotFound(m) | AppError::Conflict(m) => m,
            AppError::PayloadTooLarge => "request body too large",
            AppError::MethodNotAllowed => "method not allowed",
            AppError::Storage { message, .. } | AppError::Internal { message, .. } => message,
            AppError::Upstream(_) => "remote call failed",
            AppError::Parse(_) => "response parse failed",
        }
    }
}

impl From<QueryError> for AppError {
    fn from(_: QueryError) -> Self {
        AppError::BadRequest("invalid parameters")
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::MalformedHeaders(_) => AppError::BadRequest("invalid headers config"),
            // staged file could not be reopened; nothing was sent
            RelayError::Io(e) => AppError::internal("file save failed", e),
            other => AppError::Upstream(other),
        }
    }
}
