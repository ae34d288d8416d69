use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Game provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to obtain advisory lock '{ident}' within {timeout_ms}ms")]
    LockTimeout { ident: String, timeout_ms: u128 },

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Stored data contradicts what the pipeline expects (e.g. unknown team).
    #[error("Data invariant violated: {0}")]
    Invariant(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Failures reported by the external game-data provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("resource not found")]
    NotFound,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::NotFound => Some(404),
            ProviderError::RateLimited(_) => Some(429),
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Transport(e) => e.status().map(|s| s.as_u16()),
            ProviderError::Decode(_) => None,
        }
    }
}

/// Failures reported by the announcement provider. The text is stored on the
/// announcement row as its failure reason.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}
