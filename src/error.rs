use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Not signed in")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Persistence failure during {operation}: {reason}")]
    PersistenceFailure {
        operation: &'static str,
        reason: String,
    },

    #[error("Server returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Live feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl BoardError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        BoardError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn to_error_code(&self) -> &'static str {
        match self {
            BoardError::Unauthorized => "UNAUTHORIZED",
            BoardError::Forbidden(_) => "FORBIDDEN",
            BoardError::NotFound { .. } => "NOT_FOUND",
            BoardError::ValidationError(_) => "VALIDATION_ERROR",
            BoardError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            BoardError::Gateway { .. } | BoardError::Http(_) => "GATEWAY_ERROR",
            BoardError::Feed(_) => "FEED_ERROR",
            BoardError::Config(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
