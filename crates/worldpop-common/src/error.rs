//! Error types for WorldPop pipeline services.

use thiserror::Error;

/// Result type alias using PopError.
pub type PopResult<T> = Result<T, PopError>;

/// Primary error type shared by the storage and orchestration layers.
#[derive(Debug, Error)]
pub enum PopError {
    // === Input Errors ===
    #[error("Invalid WorldPop filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    // === Data Errors ===
    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Invalid raster encoding: {0}")]
    EncodingError(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PopError {
    /// Shorthand for an invalid parameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        PopError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from an external service (object store, database).
    pub fn is_remote(&self) -> bool {
        matches!(self, PopError::StorageError(_) | PopError::DatabaseError(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for PopError {
    fn from(err: std::io::Error) -> Self {
        PopError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for PopError {
    fn from(err: serde_json::Error) -> Self {
        PopError::InternalError(format!("JSON error: {}", err))
    }
}
