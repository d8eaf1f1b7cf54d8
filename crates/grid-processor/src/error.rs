//! Error types for grid processing.

use thiserror::Error;
use worldpop_common::{IntDataType, PopError};

/// Errors that can occur during grid processing.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// The geotransform has a zero or non-finite scale term.
    #[error("degenerate cell geometry: {0}")]
    DegenerateGeometry(String),

    /// The input grid, or every cell sampled from it, is missing.
    #[error("grid of {width}x{height} cells has no valid cells to resample")]
    EmptyGrid { width: usize, height: usize },

    /// The requested output dimensions resolve to zero.
    #[error("invalid target size {width}x{height}: {reason}")]
    InvalidTargetSize {
        width: usize,
        height: usize,
        reason: String,
    },

    /// A conserved count does not fit the configured output type.
    #[error("value {value} does not fit in {data_type}")]
    ValueOutOfRange { value: i64, data_type: IntDataType },

    /// Failed to decode or encode a GeoTIFF.
    #[error("GeoTIFF error: {0}")]
    GeoTiff(String),

    /// Invalid metadata in the raster file.
    #[error("invalid raster metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl GridProcessorError {
    /// Create an InvalidTargetSize error.
    pub fn invalid_target_size(width: usize, height: usize, reason: impl Into<String>) -> Self {
        Self::InvalidTargetSize {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// True for the failures the conserver raises before doing any work.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::DegenerateGeometry(_) | Self::EmptyGrid { .. } | Self::InvalidTargetSize { .. }
        )
    }
}

impl From<std::io::Error> for GridProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<tiff::TiffError> for GridProcessorError {
    fn from(err: tiff::TiffError) -> Self {
        Self::GeoTiff(err.to_string())
    }
}

impl From<PopError> for GridProcessorError {
    fn from(err: PopError) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
