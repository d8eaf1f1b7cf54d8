//! Synthetic population rasters.
//!
//! Every generator is deterministic so tests can assert exact totals.

use worldpop_common::{GeoTransform, Grid, Projection};

use crate::fixtures::{WORLDPOP_NODATA, WORLDPOP_PIXEL_SIZE};

/// Creates a grid where each cell holds `col * 1000 + row`.
///
/// Makes it easy to check that data was read back in row-major order.
///
/// ```
/// use test_utils::create_index_grid;
///
/// let data = create_index_grid(10, 5);
/// assert_eq!(data.len(), 50);
/// assert_eq!(data[1], 1000.0);
/// assert_eq!(data[10], 1.0);
/// ```
pub fn create_index_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates fractional head counts in `[0, max_count)`.
///
/// Roughly one cell in five is empty (0.0), as in sparsely settled areas.
pub fn create_population_counts(width: usize, height: usize, max_count: f32, seed: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let hash = simple_hash(col as u32, row as u32, seed);
            let count = if hash % 5 == 0 {
                0.0
            } else {
                (hash % 10_000) as f32 / 10_000.0 * max_count
            };
            data.push(count);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Overwrites the given (col, row) cells with `nodata`.
pub fn mask_cells(data: &mut [f32], width: usize, cells: &[(usize, usize)], nodata: f32) {
    for &(col, row) in cells {
        if let Some(cell) = data.get_mut(row * width + col) {
            *cell = nodata;
        }
    }
}

/// Overwrites every cell in the first `columns` columns of each block of
/// `block` columns with `nodata`, e.g. coastline or water bodies.
pub fn mask_columns(data: &mut [f32], width: usize, block: usize, columns: usize, nodata: f32) {
    for (i, cell) in data.iter_mut().enumerate() {
        if (i % width) % block < columns {
            *cell = nodata;
        }
    }
}

/// Wraps counts in a north-up WGS84 grid with WorldPop's pixel size and sentinel.
pub fn population_grid(data: Vec<f32>, width: usize, height: usize) -> Grid {
    Grid {
        data,
        width,
        height,
        transform: GeoTransform::north_up(3.0, 14.0, WORLDPOP_PIXEL_SIZE, -WORLDPOP_PIXEL_SIZE),
        nodata: Some(WORLDPOP_NODATA),
        projection: Projection::wgs84(),
    }
}

/// Wraps counts in a grid with unit-area cells and no CRS.
pub fn unit_grid(data: Vec<f32>, width: usize, height: usize) -> Grid {
    Grid {
        data,
        width,
        height,
        transform: GeoTransform::default(),
        nodata: Some(WORLDPOP_NODATA),
        projection: Projection::default(),
    }
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}
