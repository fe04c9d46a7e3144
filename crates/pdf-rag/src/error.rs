//! Error types for the RAG backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the auth collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token / refresh cookie supplied
    #[error("Token is missing!")]
    MissingToken,

    /// Token signature and shape are fine but `exp` is in the past
    #[error("Token expired")]
    Expired,

    /// Same as `Expired`, reported by the refresh endpoint
    #[error("Refresh token expired")]
    RefreshExpired,

    /// Malformed token or bad signature
    #[error("Token is invalid!")]
    Invalid,

    /// Unknown email or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration with an email that already exists
    #[error("Email id already exists")]
    EmailTaken,
}

/// RAG backend errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied an unusable request
    #[error("Validation error: {0}")]
    Validation(String),

    /// A corpus file could not be parsed
    #[error("Failed to ingest '{file}': {message}")]
    IngestionFailure { file: String, message: String },

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    Index(String),

    /// Persisted index failed integrity checks
    #[error("Refusing to load persisted index: {0}")]
    DeserializationUnsafe(String),

    /// Generation backend unreachable or failing
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Generation backend refused the request (bad model name, auth, payload)
    #[error("Model rejected the request: {0}")]
    ModelRejected(String),

    /// Generation backend did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// User database error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an ingestion error for a single corpus file
    pub fn ingestion(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IngestionFailure {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector index error
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// Create a deserialization safety error
    pub fn unsafe_index(message: impl Into<String>) -> Self {
        Self::DeserializationUnsafe(message.into())
    }

    /// Create a model unavailable error
    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable(message.into())
    }

    /// Create a model rejected error
    pub fn model_rejected(message: impl Into<String>) -> Self {
        Self::ModelRejected(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a caller may reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ModelUnavailable(_) | Error::Timeout(_) => true,
            Error::Http(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for AuthError {
    /// The auth collaborator answers with the flat `{"msg": ..}` body the
    /// frontend already understands.
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::Expired | AuthError::RefreshExpired | AuthError::Invalid => {
                StatusCode::FORBIDDEN
            }
            AuthError::InvalidCredentials | AuthError::EmailTaken => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "msg": self.to_string() }))).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, error_type, message) = match &self {
            Error::Auth(auth) => return auth.clone().into_response(),
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::IngestionFailure { file, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ingestion_error",
                format!("Failed to ingest '{}': {}", file, message),
            ),
            Error::Embedding(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error", msg.clone())
            }
            Error::Index(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "index_error", msg.clone()),
            Error::DeserializationUnsafe(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "unsafe_index",
                msg.clone(),
            ),
            Error::ModelUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable", msg.clone())
            }
            Error::ModelRejected(msg) => (StatusCode::BAD_GATEWAY, "model_rejected", msg.clone()),
            Error::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg.clone()),
            Error::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg.clone())
            }
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "retryable": retryable,
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
        let resp = Error::validation("Query is required").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = Error::model_unavailable("connection refused").into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = Error::Timeout("no token for 30s".into()).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_auth_status_mapping() {
        let missing = Error::from(AuthError::MissingToken).into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let expired = Error::from(AuthError::Expired).into_response();
        assert_eq!(expired.status(), StatusCode::FORBIDDEN);

        let taken = Error::from(AuthError::EmailTaken).into_response();
        assert_eq!(taken.status(), StatusCode::BAD_REQUEST);

        let refresh = Error::from(AuthError::RefreshExpired).into_response();
        assert_eq!(refresh.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_auth_body_is_flat_msg() {
        let resp = Error::from(AuthError::MissingToken).into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "msg": "Token is missing!" }));
    }

    #[test]
    fn test_model_rejected_is_not_retryable() {
        let err = Error::model_rejected("HTTP 404: no such model");
        assert!(!err.is_retryable());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::model_unavailable("down").is_retryable());
        assert!(!Error::validation("empty").is_retryable());
        assert!(!Error::unsafe_index("checksum").is_retryable());
    }
}
