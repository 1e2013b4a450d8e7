//! Error types for the AEGIS client core
//!
//! All errors use thiserror for structured error handling.
//! Most callers never see these: transient failures are logged and
//! replaced with a safe default at the component boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("No auth token in session")]
    Unauthenticated,

    #[error("Malformed push payload: {0}")]
    MalformedPush(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Whether this error only means "not logged in yet"
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AppError::Unauthenticated)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
