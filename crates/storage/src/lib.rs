//! Storage abstractions for the WorldPop pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (MinIO/S3) for conserved rasters
//! - PostgreSQL/PostGIS for the tile catalog
//! - PostGIS raster WKB encoding of output tiles

pub mod catalog;
pub mod object_store;
pub mod raster_wkb;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, UploadOutcome};
pub use catalog::{TileCatalog, TileInsertOptions, TileKey, DEFAULT_TILE_SIZE, STANDARD_SCALE};
pub use raster_wkb::{encode_tile, encode_tile_hex, PixelType, DEFAULT_SRID};
