//! API error types.

use crate::persistence::PersistenceError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use residency_core::TokenError;
use serde::Serialize;

/// API error response.
///
/// Same envelope as successful responses, with `status: false` and a
/// stable `code` for programmatic handling.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: bool,
    pub code: &'static str,
    pub message: String,
    pub data: Option<()>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No token provided")]
    AuthMissing,

    #[error("Malformed token")]
    AuthMalformed,

    #[error("Token expired")]
    AuthExpired,

    #[error("Invalid token")]
    AuthInvalid,

    #[error("No API key provided")]
    ApiKeyMissing,

    #[error("Invalid API key")]
    ApiKeyInvalid,

    /// Verifier fault. The detail is logged, never returned.
    #[error("credential verifier fault: {0}")]
    AuthInternalFault(String),

    #[error("Request must be multipart/form-data")]
    NotMultipart,

    #[error("Upload stream error: {0}")]
    Stream(String),

    #[error("No file provided")]
    NoFileProvided,

    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("Only one file may be uploaded per request")]
    MultipleFilesNotAllowed,

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    FieldParse(#[from] residency_core::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] residency_storage::StorageError),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Missing => Self::AuthMissing,
            TokenError::Malformed => Self::AuthMalformed,
            TokenError::Expired => Self::AuthExpired,
            TokenError::Invalid => Self::AuthInvalid,
            TokenError::ApiKeyMissing => Self::ApiKeyMissing,
            TokenError::ApiKeyInvalid => Self::ApiKeyInvalid,
            TokenError::Internal(detail) => Self::AuthInternalFault(detail),
        }
    }
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthMissing => "AuthMissing",
            Self::AuthMalformed => "AuthMalformed",
            Self::AuthExpired => "AuthExpired",
            Self::AuthInvalid => "AuthInvalid",
            Self::ApiKeyMissing => "ApiKeyMissing",
            Self::ApiKeyInvalid => "ApiKeyInvalid",
            Self::AuthInternalFault(_) => "AuthInternalFault",
            Self::NotMultipart => "NotMultipart",
            Self::Stream(_) => "StreamError",
            Self::NoFileProvided => "NoFileProvided",
            Self::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Self::MultipleFilesNotAllowed => "MultipleFilesNotAllowed",
            Self::PayloadTooLarge(_) => "PayloadTooLarge",
            Self::FieldParse(_) => "FieldParseError",
            Self::Persistence(PersistenceError::NotFound(_)) => "NotFound",
            Self::Persistence(_) => "PersistenceError",
            Self::NotFound(_) => "NotFound",
            Self::BadRequest(_) => "BadRequest",
            Self::Storage(residency_storage::StorageError::NotFound(_)) => "NotFound",
            Self::Storage(_) => "InternalError",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthMissing
            | Self::AuthMalformed
            | Self::AuthExpired
            | Self::AuthInvalid
            | Self::ApiKeyMissing
            | Self::ApiKeyInvalid => StatusCode::UNAUTHORIZED,
            Self::AuthInternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotMultipart
            | Self::Stream(_)
            | Self::NoFileProvided
            | Self::MultipleFilesNotAllowed
            | Self::FieldParse(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Persistence(PersistenceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(e) => match e {
                residency_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                residency_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Message safe to send to clients. Server-side faults get a generic
    /// message; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::AuthInternalFault(_) => "Authentication middleware error".to_string(),
            Self::Persistence(PersistenceError::NotFound(id)) => format!("Report {id} not found"),
            Self::Storage(residency_storage::StorageError::NotFound(_)) => "Not found".to_string(),
            _ if self.status_code().is_server_error() => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            status: false,
            code: self.code(),
            message: self.public_message(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
