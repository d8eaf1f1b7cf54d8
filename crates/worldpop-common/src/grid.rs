//! In-memory raster grids.
//!
//! A [`Grid`] holds floating-point cell values read from a source raster; an
//! [`IntGrid`] holds the integer counts produced by the conservation step.
//! Both carry their geotransform and projection so they can be written back
//! out without consulting the source file.

use serde::{Deserialize, Serialize};

use crate::error::{PopError, PopResult};
use crate::transform::GeoTransform;

/// Relative tolerance used when comparing a cell against the no-data sentinel.
const NODATA_RTOL: f64 = 1e-5;
/// Absolute tolerance used when comparing a cell against the no-data sentinel.
const NODATA_ATOL: f64 = 1e-8;

/// Opaque coordinate reference descriptor.
///
/// Holds the GeoTIFF projection keys verbatim so the output raster can carry
/// exactly what the input declared. Nothing in the pipeline interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// GeoKeyDirectoryTag (34735) contents.
    pub geo_key_directory: Vec<u16>,
    /// GeoDoubleParamsTag (34736) contents.
    pub geo_double_params: Vec<f64>,
    /// GeoAsciiParamsTag (34737) contents.
    pub geo_ascii_params: Option<String>,
}

impl Projection {
    /// Geographic WGS84 (EPSG:4326), the CRS WorldPop publishes in.
    pub fn wgs84() -> Self {
        Self {
            geo_key_directory: vec![
                1, 1, 0, 3, // header: version 1.1.0, 3 keys
                1024, 0, 1, 2, // GTModelTypeGeoKey = Geographic
                1025, 0, 1, 1, // GTRasterTypeGeoKey = PixelIsArea
                2048, 0, 1, 4326, // GeographicTypeGeoKey = EPSG:4326
            ],
            geo_double_params: Vec::new(),
            geo_ascii_params: None,
        }
    }

    /// True when no projection keys are present.
    pub fn is_empty(&self) -> bool {
        self.geo_key_directory.is_empty()
    }

    /// EPSG code declared by the geographic or projected CRS key, if any.
    pub fn epsg(&self) -> Option<u16> {
        // Header is 4 shorts, then 4 shorts per key: id, location, count, value.
        self.geo_key_directory
            .get(4..)?
            .chunks_exact(4)
            .find(|key| (key[0] == 2048 || key[0] == 3072) && key[1] == 0)
            .map(|key| key[3])
    }
}

/// A single-band floating-point raster.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Cell values, row-major, top row first.
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Sentinel marking cells without an observation. NaN cells are always missing.
    pub nodata: Option<f64>,
    pub projection: Projection,
}

impl Grid {
    /// Create a grid, checking that the buffer matches the dimensions.
    pub fn new(
        data: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: Option<f64>,
        projection: Projection,
    ) -> PopResult<Self> {
        if data.len() != width * height {
            return Err(PopError::invalid_parameter(
                "data",
                format!(
                    "buffer has {} cells, expected {}x{} = {}",
                    data.len(),
                    width,
                    height,
                    width * height
                ),
            ));
        }

        Ok(Self {
            data,
            width,
            height,
            transform,
            nodata,
            projection,
        })
    }

    /// Whether a raw cell value is missing (NaN or close to the sentinel).
    pub fn is_missing(&self, value: f32) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nodata) => {
                let v = value as f64;
                (v - nodata).abs() <= NODATA_ATOL + NODATA_RTOL * nodata.abs()
            }
            None => false,
        }
    }

    /// Number of cells that carry an observation.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_missing(v)).count()
    }

    /// Sum of all valid cells, accumulated in f64.
    pub fn valid_sum(&self) -> f64 {
        self.data
            .iter()
            .filter(|&&v| !self.is_missing(v))
            .map(|&v| v as f64)
            .sum()
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Integer sample type of an output raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntDataType {
    /// 16-bit signed, the historical output type.
    #[default]
    Int16,
    /// 32-bit signed, for denser source data.
    Int32,
}

impl IntDataType {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "int16" | "i16" | "int16s" => Some(Self::Int16),
            "int32" | "i32" | "int32s" => Some(Self::Int32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Int32 => "int32",
        }
    }

    /// Smallest representable value.
    pub fn min_value(&self) -> i64 {
        match self {
            Self::Int16 => i16::MIN as i64,
            Self::Int32 => i32::MIN as i64,
        }
    }

    /// Largest representable value.
    pub fn max_value(&self) -> i64 {
        match self {
            Self::Int16 => i16::MAX as i64,
            Self::Int32 => i32::MAX as i64,
        }
    }

    /// Whether `value` fits in this type.
    pub fn can_hold(&self, value: i64) -> bool {
        value >= self.min_value() && value <= self.max_value()
    }
}

impl std::fmt::Display for IntDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single-band integer raster with an explicit no-data sentinel.
#[derive(Debug, Clone)]
pub struct IntGrid {
    /// Cell values, row-major, top row first.
    pub data: Vec<i32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: i32,
    pub data_type: IntDataType,
    pub projection: Projection,
}

impl IntGrid {
    /// Sum of all cells not equal to the sentinel.
    pub fn valid_sum(&self) -> i64 {
        self.data
            .iter()
            .filter(|&&v| v != self.nodata)
            .map(|&v| v as i64)
            .sum()
    }

    /// Split into `tile_size x tile_size` tiles, row-major. Edge tiles are smaller.
    pub fn tiles(&self, tile_size: usize) -> impl Iterator<Item = IntTile> + '_ {
        let tile_size = tile_size.max(1);
        let tiles_x = (self.width + tile_size - 1) / tile_size;
        let tiles_y = (self.height + tile_size - 1) / tile_size;

        (0..tiles_y).flat_map(move |ty| {
            (0..tiles_x).map(move |tx| {
                let col_offset = tx * tile_size;
                let row_offset = ty * tile_size;
                let width = tile_size.min(self.width - col_offset);
                let height = tile_size.min(self.height - row_offset);

                let mut data = Vec::with_capacity(width * height);
                for row in row_offset..row_offset + height {
                    let start = row * self.width + col_offset;
                    data.extend_from_slice(&self.data[start..start + width]);
                }

                IntTile {
                    index: ty * tiles_x + tx,
                    col_offset,
                    row_offset,
                    width,
                    height,
                    data,
                    transform: self.transform.offset(col_offset, row_offset),
                    nodata: self.nodata,
                    data_type: self.data_type,
                }
            })
        })
    }
}

/// A rectangular window of an [`IntGrid`].
#[derive(Debug, Clone)]
pub struct IntTile {
    /// Row-major tile number within the parent grid, starting at 0.
    pub index: usize,
    pub col_offset: usize,
    pub row_offset: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<i32>,
    pub transform: GeoTransform,
    pub nodata: i32,
    pub data_type: IntDataType,
}

impl IntTile {
    /// True when every cell is the sentinel.
    pub fn is_all_nodata(&self) -> bool {
        self.data.iter().all(|&v| v == self.nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_grid(width: usize, height: usize) -> IntGrid {
        IntGrid {
            data: (0..(width * height) as i32).collect(),
            width,
            height,
            transform: GeoTransform::north_up(0.0, 10.0, 1.0, -1.0),
            nodata: -9999,
            data_type: IntDataType::Int16,
            projection: Projection::wgs84(),
        }
    }

    #[test]
    fn test_grid_rejects_wrong_buffer() {
        let result = Grid::new(
            vec![0.0; 5],
            2,
            3,
            GeoTransform::default(),
            None,
            Projection::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_uses_tolerance() {
        let grid = Grid::new(
            vec![1.0, -99999.0, -99998.999, f32::NAN],
            2,
            2,
            GeoTransform::default(),
            Some(-99999.0),
            Projection::default(),
        )
        .unwrap();

        assert!(!grid.is_missing(1.0));
        assert!(grid.is_missing(-99999.0));
        assert!(grid.is_missing(-99998.999));
        assert!(grid.is_missing(f32::NAN));
        assert_eq!(grid.valid_count(), 1);
        assert!((grid.valid_sum() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nan_is_missing_without_sentinel() {
        let grid = Grid::new(
            vec![2.0, f32::NAN],
            2,
            1,
            GeoTransform::default(),
            None,
            Projection::default(),
        )
        .unwrap();
        assert_eq!(grid.valid_count(), 1);
    }

    #[test]
    fn test_int_data_type_ranges() {
        assert!(IntDataType::Int16.can_hold(32767));
        assert!(!IntDataType::Int16.can_hold(32768));
        assert!(IntDataType::Int32.can_hold(32768));
        assert_eq!(IntDataType::from_str("INT32"), Some(IntDataType::Int32));
        assert_eq!(IntDataType::from_str("float"), None);
    }

    #[test]
    fn test_int_grid_sums_skip_sentinel() {
        let mut grid = int_grid(2, 2);
        grid.data = vec![3, -9999, 4, 0];
        assert_eq!(grid.valid_sum(), 7);
    }

    #[test]
    fn test_tiles_cover_grid_once() {
        let grid = int_grid(5, 3);
        let tiles: Vec<_> = grid.tiles(2).collect();

        // 3 tiles across, 2 down
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[2].width, 1);
        assert_eq!(tiles[5].height, 1);

        let total: usize = tiles.iter().map(|t| t.data.len()).sum();
        assert_eq!(total, 15);

        // Tile 4 starts at col 2, row 2
        assert_eq!(tiles[4].index, 4);
        assert_eq!(tiles[4].data, vec![12, 13]);
        assert_eq!(tiles[4].transform.apply(0.0, 0.0), (2.0, 8.0));
    }

    #[test]
    fn test_projection_epsg() {
        assert_eq!(Projection::wgs84().epsg(), Some(4326));
        assert_eq!(Projection::default().epsg(), None);
    }
}
