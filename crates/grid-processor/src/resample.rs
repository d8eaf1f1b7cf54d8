//! Nearest-neighbour resampling over a fixed extent.
//!
//! The output grid covers the same extent as the input with a different
//! number of cells. Each output cell takes the value of the input cell that
//! contains its centre, so a missing (NaN) input never blends into a valid
//! output and every valid output traces back to exactly one input sample.

use worldpop_common::GeoTransform;

/// Input column/row whose cell contains the centre of output cell `dst`.
///
/// `src_len` input cells and `dst_len` output cells span the same extent.
#[inline]
pub fn source_index(dst: usize, src_len: usize, dst_len: usize) -> usize {
    let centre = (dst as f64 + 0.5) * src_len as f64 / dst_len as f64;
    (centre.floor() as usize).min(src_len - 1)
}

/// Resample a row-major grid to `dst_width x dst_height` by nearest neighbour.
///
/// NaN marks missing cells in both input and output.
pub fn resample_nearest(
    data: &[f64],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<f64> {
    let mut output = vec![f64::NAN; dst_width * dst_height];
    if src_width == 0 || src_height == 0 {
        return output;
    }

    let cols: Vec<usize> = (0..dst_width)
        .map(|dx| source_index(dx, src_width, dst_width))
        .collect();

    for dy in 0..dst_height {
        let sy = source_index(dy, src_height, dst_height);
        let src_row = &data[sy * src_width..(sy + 1) * src_width];
        let dst_row = &mut output[dy * dst_width..(dy + 1) * dst_width];

        for (dst, &sx) in dst_row.iter_mut().zip(&cols) {
            *dst = src_row[sx];
        }
    }

    output
}

/// Geotransform of a `dst_width x dst_height` grid covering the same extent.
///
/// Returns the input transform unchanged when the size does not change.
pub fn resampled_transform(
    transform: &GeoTransform,
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> GeoTransform {
    if src_width == dst_width && src_height == dst_height {
        return *transform;
    }

    transform.scaled(
        src_width as f64 / dst_width as f64,
        src_height as f64 / dst_height as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_index_picks_centre_cell() {
        // 10 input cells per output cell, centre at 5
        assert_eq!(source_index(0, 100, 10), 5);
        assert_eq!(source_index(9, 100, 10), 95);
        // Same size is the identity
        for i in 0..7 {
            assert_eq!(source_index(i, 7, 7), i);
        }
        // Non-divisible sizes stay in range
        assert_eq!(source_index(9, 105, 10), 99);
    }

    #[test]
    fn test_resample_nearest_downsamples() {
        // 4x4 with values 0..16, downsample to 2x2 -> centres at (1, 1), (3, 1), ...
        let data: Vec<f64> = (0..16).map(|x| x as f64).collect();
        let result = resample_nearest(&data, 4, 4, 2, 2);
        assert_eq!(result, vec![5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn test_resample_nearest_keeps_missing() {
        let mut data = vec![1.0f64; 16];
        data[5] = f64::NAN;
        let result = resample_nearest(&data, 4, 4, 2, 2);
        assert!(result[0].is_nan());
        assert_eq!(&result[1..], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_resampled_transform_identity() {
        let t = GeoTransform::north_up(3.0, 4.0, 0.1, -0.1);
        assert_eq!(resampled_transform(&t, 50, 40, 50, 40), t);

        let coarse = resampled_transform(&t, 50, 40, 5, 4);
        assert!((coarse.pixel_width - 1.0).abs() < 1e-12);
        assert!((coarse.pixel_height + 1.0).abs() < 1e-12);
    }
}
