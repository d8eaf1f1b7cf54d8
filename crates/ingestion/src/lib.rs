//! WorldPop processing pipeline.
//!
//! Ties the pieces together for one country and year:
//!
//! - list and fetch source rasters (HTTPS mirror or a local directory)
//! - skip rasters already in object storage
//! - conserve each raster to ~1km integer counts
//! - insert tiles into the configured PostGIS databases
//! - upload the conserved raster and clean up

pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;

// Re-exports
pub use config::{DatabaseTarget, PipelineConfig, DEFAULT_SOURCE_URL};
pub use error::{IngestionError, Result};
pub use pipeline::{CatalogTarget, FailedRaster, Pipeline, PipelineSummary, RasterOutcome};
pub use source::{HttpSource, LocalDirSource, RasterSource, RemoteRaster};
