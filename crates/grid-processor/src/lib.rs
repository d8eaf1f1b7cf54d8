//! Count-conserving raster downsampling.
//!
//! This crate turns WorldPop's ~100m population-count rasters into ~1km
//! rasters whose integer cells still add up to the input national total.
//!
//! # Pipeline
//!
//! ```text
//! GeoTIFF (f32 counts, nodata)
//!      │
//!      ▼
//! geotiff::read_grid ──► Grid
//!      │
//!      ▼
//! RasterConserver::conserve
//!      │
//!      ├─► normalize by input cell area
//!      ├─► nearest-neighbour resample (factor 10 by default)
//!      ├─► de-normalize by output cell area
//!      ├─► rescale to the input total
//!      └─► integer rounding repair
//!               │
//!               ▼
//!          IntGrid + ConservationReport
//!               │
//!               ▼
//! geotiff::write_int_grid (Int16/Int32, LZW)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{conserve_file, ConserveConfig, RasterConserver};
//!
//! let conserver = RasterConserver::new(ConserveConfig::default())?;
//! let report = conserve_file("nga_f_0_2020.tif", "nga_f_0_2020.tif", &conserver)?;
//! assert_eq!(report.output_sum, report.orig_sum.round() as i64);
//! ```

pub mod config;
pub mod conserve;
pub mod error;
pub mod geotiff;
pub mod quantile;
pub mod resample;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ConserveConfig, DEFAULT_DOWNSAMPLE_FACTOR, DEFAULT_OUTPUT_NODATA};
pub use conserve::{repair_rounding, Conserved, RasterConserver, RoundingOutcome};
pub use error::{GridProcessorError, Result};
pub use geotiff::{
    conserve_file, conserve_file_to_grid, read_grid, read_grid_from, read_int_grid, write_grid,
    write_int_grid,
};
pub use quantile::{quantile, quantile_sorted};
pub use resample::{resample_nearest, resampled_transform, source_index};
pub use types::{ConservationReport, EmptyGridPolicy, QuantileMethod};
