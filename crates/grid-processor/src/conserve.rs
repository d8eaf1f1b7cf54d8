//! Count-conserving downsampling of population rasters.
//!
//! A population raster stores a head count per cell. Shrinking it by plain
//! resampling would change the national total, so the conserver works on
//! densities and repairs the sum afterwards:
//!
//! 1. **Normalize**: divide each valid count by the input cell area.
//! 2. **Resample**: nearest-neighbour over the densities to the target size.
//! 3. **De-normalize**: multiply by the output cell area.
//! 4. **Rescale**: scale every valid cell so the total equals the input total.
//!    If the sampled cells are all zero the total is split evenly instead.
//! 5. **Round**: truncate to integers and hand the lost mass back one person
//!    at a time to the cells with the largest fractional parts.
//!
//! The integer output sums to the input total rounded to the nearest integer.

use worldpop_common::{GeoTransform, Grid, IntGrid};

use crate::config::ConserveConfig;
use crate::error::{GridProcessorError, Result};
use crate::quantile::quantile;
use crate::resample::{resample_nearest, resampled_transform};
use crate::types::{ConservationReport, EmptyGridPolicy, QuantileMethod};

/// Integer grid produced by a conservation run, with its bookkeeping.
#[derive(Debug, Clone)]
pub struct Conserved {
    pub grid: IntGrid,
    pub report: ConservationReport,
}

/// Outcome of the integer repair step.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundingOutcome {
    /// Integer value per input cell, same order as the input.
    pub values: Vec<i64>,
    pub deficit: f64,
    pub threshold: Option<f64>,
    pub cells_bumped: usize,
    pub tie_adjustments: usize,
}

/// Downsamples population grids while keeping their total.
#[derive(Debug, Clone)]
pub struct RasterConserver {
    config: ConserveConfig,
}

impl RasterConserver {
    /// Create a conserver, rejecting invalid configuration.
    pub fn new(config: ConserveConfig) -> Result<Self> {
        config.validate().map_err(GridProcessorError::ConfigError)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConserveConfig {
        &self.config
    }

    /// Output size for an input of `width x height`.
    pub fn target_size(&self, width: usize, height: usize) -> (usize, usize) {
        self.config.target_size(width, height)
    }

    /// Downsample by the configured factor.
    pub fn conserve(&self, grid: &Grid) -> Result<Conserved> {
        let (width, height) = self.target_size(grid.width, grid.height);
        self.conserve_to_size(grid, width, height)
    }

    /// Resample to an explicit `width x height`, keeping the grid's extent.
    pub fn conserve_to_size(&self, grid: &Grid, width: usize, height: usize) -> Result<Conserved> {
        if grid.transform.is_degenerate() {
            return Err(GridProcessorError::DegenerateGeometry(format!(
                "pixel size {} x {}",
                grid.transform.pixel_width, grid.transform.pixel_height
            )));
        }

        if width == 0 || height == 0 {
            return Err(GridProcessorError::invalid_target_size(
                width,
                height,
                format!(
                    "input of {}x{} cells is smaller than the downsample factor {}",
                    grid.width, grid.height, self.config.downsample_factor
                ),
            ));
        }

        let transform = resampled_transform(&grid.transform, grid.width, grid.height, width, height);
        let mut report = ConservationReport {
            input_size: (grid.width, grid.height),
            output_size: (width, height),
            area_in: grid.transform.cell_area(),
            area_out: transform.cell_area(),
            ..Default::default()
        };

        // Normalize
        let mut density = Vec::with_capacity(grid.len());
        for &value in &grid.data {
            if grid.is_missing(value) {
                density.push(f64::NAN);
            } else {
                report.valid_in += 1;
                report.orig_sum += value as f64;
                density.push(value as f64 / report.area_in);
            }
        }

        if report.valid_in == 0 {
            match self.config.empty_grid {
                EmptyGridPolicy::Error => {
                    return Err(GridProcessorError::EmptyGrid {
                        width: grid.width,
                        height: grid.height,
                    })
                }
                EmptyGridPolicy::NoData => {
                    tracing::warn!(
                        width = grid.width,
                        height = grid.height,
                        "Input grid has no valid cells, writing an all no-data output"
                    );
                    return Ok(self.finish(grid, transform, vec![None; width * height], report));
                }
            }
        }

        tracing::debug!(
            valid_in = report.valid_in,
            orig_sum = report.orig_sum,
            area_in = report.area_in,
            "Normalized counts to densities"
        );

        // Resample, then de-normalize
        let mut counts = resample_nearest(&density, grid.width, grid.height, width, height);
        for value in counts.iter_mut().filter(|v| !v.is_nan()) {
            *value *= report.area_out;
        }

        report.valid_out = counts.iter().filter(|v| !v.is_nan()).count();
        report.resampled_sum = counts.iter().filter(|v| !v.is_nan()).sum();

        tracing::debug!(
            width,
            height,
            valid_out = report.valid_out,
            resampled_sum = report.resampled_sum,
            area_ratio = report.area_ratio(),
            "Resampled densities"
        );

        if report.valid_out == 0 {
            match self.config.empty_grid {
                EmptyGridPolicy::Error => {
                    return Err(GridProcessorError::EmptyGrid {
                        width: grid.width,
                        height: grid.height,
                    })
                }
                EmptyGridPolicy::NoData => {
                    tracing::warn!(
                        width,
                        height,
                        valid_in = report.valid_in,
                        "No sampled cell is valid, writing an all no-data output"
                    );
                    return Ok(self.finish(grid, transform, vec![None; width * height], report));
                }
            }
        }

        // Rescale
        if report.resampled_sum != 0.0 && report.resampled_sum.is_finite() {
            let factor = report.orig_sum / report.resampled_sum;
            for value in counts.iter_mut().filter(|v| !v.is_nan()) {
                *value *= factor;
            }
            report.scale_factor = Some(factor);
        } else if report.orig_sum > 0.0 {
            // Every sampled cell is empty; there is no shape to scale
            let share = report.orig_sum / report.valid_out as f64;
            for value in counts.iter_mut().filter(|v| !v.is_nan()) {
                *value = share;
            }
            report.spread_evenly = true;
            tracing::warn!(
                valid_out = report.valid_out,
                orig_sum = report.orig_sum,
                "Sampled cells sum to zero, spreading the total evenly"
            );
        }

        // Round
        let valid: Vec<f64> = counts.iter().copied().filter(|v| !v.is_nan()).collect();
        let outcome = repair_rounding(&valid, report.orig_sum, self.config.quantile_method);

        report.deficit = outcome.deficit;
        report.threshold = outcome.threshold;
        report.cells_bumped = outcome.cells_bumped;
        report.tie_adjustments = outcome.tie_adjustments;

        let mut rounded = outcome.values.into_iter();
        let cells: Vec<Option<i64>> = counts
            .iter()
            .map(|v| if v.is_nan() { None } else { rounded.next() })
            .collect();

        for value in cells.iter().flatten() {
            if !self.config.output_type.can_hold(*value) {
                return Err(GridProcessorError::ValueOutOfRange {
                    value: *value,
                    data_type: self.config.output_type,
                });
            }
        }

        Ok(self.finish(grid, transform, cells, report))
    }

    fn finish(
        &self,
        grid: &Grid,
        transform: GeoTransform,
        cells: Vec<Option<i64>>,
        mut report: ConservationReport,
    ) -> Conserved {
        let nodata = self.config.output_nodata;
        let data: Vec<i32> = cells
            .iter()
            .map(|cell| cell.map_or(nodata, |v| v as i32))
            .collect();

        report.output_sum = cells.iter().flatten().sum();

        tracing::info!(
            input = %format!("{}x{}", report.input_size.0, report.input_size.1),
            output = %format!("{}x{}", report.output_size.0, report.output_size.1),
            orig_sum = report.orig_sum,
            output_sum = report.output_sum,
            cells_bumped = report.cells_bumped,
            "Conserved population grid"
        );

        Conserved {
            grid: IntGrid {
                data,
                width: report.output_size.0,
                height: report.output_size.1,
                transform,
                nodata,
                data_type: self.config.output_type,
                projection: grid.projection.clone(),
            },
            report,
        }
    }
}

/// Round non-negative real counts to integers whose sum is `round(target)`.
///
/// Every value is truncated, then the `k = round(target - floor_sum)` cells
/// with the largest fractional parts get +1. Candidates are the cells whose
/// remainder exceeds the `1 - k/n` quantile of all remainders. If that set is
/// not exactly `k` cells, remainders equal to the threshold are added in
/// row-major order, or the smallest selected remainders are dropped starting
/// from the last cell, until it is.
pub fn repair_rounding(
    values: &[f64],
    target: f64,
    method: QuantileMethod,
) -> RoundingOutcome {
    let n = values.len();
    let floors: Vec<f64> = values.iter().map(|v| v.floor()).collect();
    let remainders: Vec<f64> = values.iter().zip(&floors).map(|(v, f)| v - f).collect();

    let floor_sum: f64 = floors.iter().sum();
    let deficit = target - floor_sum;
    let k = (deficit.round().max(0.0) as usize).min(n);

    let threshold = if n == 0 {
        None
    } else {
        quantile(&remainders, 1.0 - k as f64 / n as f64, method)
    };

    let mut bumped: Vec<bool> = match threshold {
        Some(t) => remainders.iter().map(|&r| r > t).collect(),
        None => vec![false; n],
    };
    let selected = bumped.iter().filter(|&&b| b).count();

    let tie_adjustments = if selected < k {
        // Unselected cells, largest remainder first, row-major among equals
        let mut candidates: Vec<usize> = (0..n).filter(|&i| !bumped[i]).collect();
        candidates.sort_by(|&a, &b| remainders[b].total_cmp(&remainders[a]).then(a.cmp(&b)));
        for &i in candidates.iter().take(k - selected) {
            bumped[i] = true;
        }
        k - selected
    } else if selected > k {
        // Selected cells, smallest remainder first, last cell first among equals
        let mut candidates: Vec<usize> = (0..n).filter(|&i| bumped[i]).collect();
        candidates.sort_by(|&a, &b| remainders[a].total_cmp(&remainders[b]).then(b.cmp(&a)));
        for &i in candidates.iter().take(selected - k) {
            bumped[i] = false;
        }
        selected - k
    } else {
        0
    };

    let values = floors
        .iter()
        .zip(&bumped)
        .map(|(&f, &b)| f as i64 + i64::from(b))
        .collect();

    RoundingOutcome {
        values,
        deficit,
        threshold,
        cells_bumped: k,
        tie_adjustments,
    }
}
