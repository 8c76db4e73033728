use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Malformed or invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A license ciphertext that does not decrypt under the configured key.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Missing, invalid or expired credentials.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role or permission set does not allow the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// The license is already active.
    #[error("License already activated")]
    AlreadyActive,

    /// The license is absent or not active.
    #[error("License is not active or does not exist")]
    NotActive,

    /// The license term has ended.
    #[error("License has expired")]
    Expired,

    /// The license reached its activation cap.
    #[error("License usage limit exceeded")]
    UsageLimitExceeded,

    /// A uniqueness conflict (username, role name, license key).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// A cryptographic primitive failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand for a `NotFound` naming the missing entity.
    pub fn not_found(entity: &str) -> Self {
        AppError::NotFound(format!("{} not found", entity))
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Redis(_)
            | AppError::Crypto(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::Decryption(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyActive
            | AppError::NotActive
            | AppError::Expired
            | AppError::UsageLimitExceeded => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Internal server error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Internal server error".to_string()
            }

            AppError::Crypto(ref msg) => {
                tracing::error!("Crypto error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Decryption(ref msg) => {
                tracing::warn!("Decryption failed: {}", msg);
                "Invalid license key".to_string()
            }

            AppError::Unauthorized(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Authorization failed: {}", msg);
                msg.clone()
            }

            AppError::RateLimited(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }

            AppError::Validation(ref msg) | AppError::NotFound(ref msg) | AppError::Conflict(ref msg) => {
                tracing::debug!("Request rejected: {}", msg);
                msg.clone()
            }

            ref other => {
                tracing::debug!("License state conflict: {}", other);
                other.to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
