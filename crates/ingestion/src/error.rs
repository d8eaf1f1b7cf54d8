//! Error types for the ingestion crate.

use grid_processor::GridProcessorError;
use thiserror::Error;
use worldpop_common::PopError;

/// Errors that can occur while running the pipeline.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Conservation failed: {0}")]
    Processing(#[from] GridProcessorError),

    #[error("Failed to upload to storage: {0}")]
    StorageUpload(String),

    #[error("Failed to insert into catalog: {0}")]
    CatalogInsert(String),

    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<PopError> for IngestionError {
    fn from(err: PopError) -> Self {
        match err {
            PopError::InvalidFilename(name) => {
                IngestionError::MissingMetadata(format!("cannot parse {}", name))
            }
            PopError::DatabaseError(msg) => IngestionError::CatalogInsert(msg),
            other => IngestionError::StorageUpload(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for IngestionError {
    fn from(err: reqwest::Error) -> Self {
        IngestionError::Download {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
