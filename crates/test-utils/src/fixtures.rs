//! Common fixtures for WorldPop tests.

/// WorldPop's 3 arc-second cell size in degrees (~100m at the equator).
pub const WORLDPOP_PIXEL_SIZE: f64 = 0.000_833_333_3;

/// Sentinel WorldPop writes into cells outside the country mask.
pub const WORLDPOP_NODATA: f64 = -99999.0;

/// Country codes used across tests.
pub mod countries {
    pub const NIGERIA: &str = "NGA";
    pub const KENYA: &str = "KEN";
    pub const LUXEMBOURG: &str = "LUX";
}

/// Source raster names in WorldPop's convention.
pub mod filenames {
    pub const NGA_F_0_2020: &str = "nga_f_0_2020.tif";
    pub const NGA_M_80_2020: &str = "nga_m_80_2020.tif";
    pub const KEN_F_15_2015: &str = "ken_f_15_2015.tif";

    /// Names the filename parser must reject.
    pub const INVALID: [&str; 4] = [
        "nga_f_15_2020.png",
        "nga_x_15_2020.tif",
        "nga_f_150_2020.tif",
        "readme.tif",
    ];
}

/// Grid sizes used in tests.
pub mod grid {
    /// Small grid shape used by tests.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub width: usize,
        pub height: usize,
    }

    impl GridSpec {
        /// Total number of cells.
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// Size after a linear downsample by `factor`.
        pub fn downsampled(&self, factor: usize) -> (usize, usize) {
            (self.width / factor, self.height / factor)
        }
    }

    /// Collapses to a single output cell.
    pub const SINGLE_BLOCK: GridSpec = GridSpec {
        width: 10,
        height: 10,
    };

    /// 2x2 output cells.
    pub const TWO_BY_TWO: GridSpec = GridSpec {
        width: 20,
        height: 20,
    };

    /// Not a multiple of the default factor in either direction.
    pub const RAGGED: GridSpec = GridSpec {
        width: 137,
        height: 94,
    };

    /// Smaller than the default factor, no output cells.
    pub const TOO_SMALL: GridSpec = GridSpec {
        width: 9,
        height: 12,
    };
}

#[cfg(test)]
mod tests {
    use super::grid::*;

    #[test]
    fn test_grid_spec_downsampled() {
        assert_eq!(TWO_BY_TWO.downsampled(10), (2, 2));
        assert_eq!(RAGGED.downsampled(10), (13, 9));
        assert_eq!(TOO_SMALL.downsampled(10), (0, 1));
        assert_eq!(SINGLE_BLOCK.size(), 100);
    }
}
