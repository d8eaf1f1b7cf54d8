//! Affine geotransform mapping array indices to spatial coordinates.

use serde::{Deserialize, Serialize};

/// Six-term affine transform in GDAL order.
///
/// A cell at `(col, row)` has its top-left corner at
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a north-up transform without rotation.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Build from the GDAL `[x0, a, b, y0, d, e]` array.
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to the GDAL `[x0, a, b, y0, d, e]` array.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Area of one cell, `|pixel_width * pixel_height|`.
    ///
    /// Rotation terms do not contribute; every cell of a grid has this area.
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// True when a scale term is zero or non-finite, so the cell area is unusable.
    pub fn is_degenerate(&self) -> bool {
        let area = self.cell_area();
        !(area.is_finite() && area > 0.0)
            || !self.origin_x.is_finite()
            || !self.origin_y.is_finite()
    }

    /// Whether the transform carries rotation/skew terms.
    pub fn is_rotated(&self) -> bool {
        self.row_rotation != 0.0 || self.col_rotation != 0.0
    }

    /// Map fractional pixel coordinates to spatial coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Same origin, with the column basis scaled by `fx` and the row basis by `fy`.
    ///
    /// Used when the same extent is covered by fewer (fx, fy > 1) cells.
    pub fn scaled(&self, fx: f64, fy: f64) -> Self {
        Self {
            origin_x: self.origin_x,
            pixel_width: self.pixel_width * fx,
            row_rotation: self.row_rotation * fy,
            origin_y: self.origin_y,
            col_rotation: self.col_rotation * fx,
            pixel_height: self.pixel_height * fy,
        }
    }

    /// Transform for a window whose top-left cell is `(col, row)` of this grid.
    pub fn offset(&self, col: usize, row: usize) -> Self {
        let (x, y) = self.apply(col as f64, row as f64);
        Self {
            origin_x: x,
            origin_y: y,
            ..*self
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0, -1.0)
    }
}
