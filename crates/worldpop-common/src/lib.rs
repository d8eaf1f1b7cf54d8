//! Common types and utilities shared across the WorldPop pipeline crates.

pub mod error;
pub mod grid;
pub mod metadata;
pub mod transform;

pub use error::{PopError, PopResult};
pub use grid::{Grid, IntDataType, IntGrid, IntTile, Projection};
pub use metadata::{
    is_valid_iso3, source_filenames, storage_prefix, AgeBracket, Gender, RasterFileInfo,
    AGE_BRACKETS,
};
pub use transform::GeoTransform;
