//! Core types for grid processing.

use serde::{Deserialize, Serialize};

/// Estimator used to place the rounding threshold between order statistics.
///
/// Mirrors the classic percentile definitions: with `n` sorted samples and
/// quantile `q`, the fractional rank is `h = (n - 1) * q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantileMethod {
    /// Linear interpolation between the samples at `floor(h)` and `ceil(h)`.
    #[default]
    Linear,
    /// Sample at `floor(h)`.
    Lower,
    /// Sample at `ceil(h)`.
    Higher,
    /// Sample nearest to `h`, ties to the even rank.
    Nearest,
    /// Mean of the samples at `floor(h)` and `ceil(h)`.
    Midpoint,
}

impl QuantileMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "lower" => Self::Lower,
            "higher" => Self::Higher,
            "nearest" => Self::Nearest,
            "midpoint" => Self::Midpoint,
            _ => Self::Linear,
        }
    }
}

impl std::fmt::Display for QuantileMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Lower => write!(f, "lower"),
            Self::Higher => write!(f, "higher"),
            Self::Nearest => write!(f, "nearest"),
            Self::Midpoint => write!(f, "midpoint"),
        }
    }
}

/// What to do with an input grid that has no valid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyGridPolicy {
    /// Fail with `GridProcessorError::EmptyGrid`.
    #[default]
    Error,
    /// Produce an output grid where every cell is the no-data sentinel.
    NoData,
}

impl EmptyGridPolicy {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nodata" | "no_data" | "passthrough" => Self::NoData,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for EmptyGridPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::NoData => write!(f, "nodata"),
        }
    }
}

/// Bookkeeping produced by one conservation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConservationReport {
    /// Input dimensions (width, height).
    pub input_size: (usize, usize),
    /// Output dimensions (width, height).
    pub output_size: (usize, usize),
    /// Cell area of the input grid.
    pub area_in: f64,
    /// Cell area of the output grid.
    pub area_out: f64,
    /// Valid cells in the input.
    pub valid_in: usize,
    /// Valid cells in the output.
    pub valid_out: usize,
    /// Sum of valid input counts.
    pub orig_sum: f64,
    /// Sum of valid counts after resampling and de-normalizing, before rescale.
    pub resampled_sum: f64,
    /// Factor applied by the global rescale, `None` when it was skipped.
    pub scale_factor: Option<f64>,
    /// The sampled cells summed to zero, so the input total was split evenly
    /// across the valid output cells instead of rescaled.
    pub spread_evenly: bool,
    /// `orig_sum` minus the sum of truncated integer parts.
    pub deficit: f64,
    /// Remainder threshold from the quantile estimator.
    pub threshold: Option<f64>,
    /// Cells that received +1.
    pub cells_bumped: usize,
    /// Of `cells_bumped`, how many were settled by tie-breaking at the threshold.
    pub tie_adjustments: usize,
    /// Sum of the integer output.
    pub output_sum: i64,
}

impl ConservationReport {
    /// `output_sum - orig_sum`.
    pub fn residual(&self) -> f64 {
        self.output_sum as f64 - self.orig_sum
    }

    /// `area_out / area_in`.
    pub fn area_ratio(&self) -> f64 {
        if self.area_in == 0.0 {
            0.0
        } else {
            self.area_out / self.area_in
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_method_from_str() {
        assert_eq!(QuantileMethod::from_str("LINEAR"), QuantileMethod::Linear);
        assert_eq!(QuantileMethod::from_str("lower"), QuantileMethod::Lower);
        assert_eq!(QuantileMethod::from_str("higher"), QuantileMethod::Higher);
        assert_eq!(QuantileMethod::from_str("nearest"), QuantileMethod::Nearest);
        assert_eq!(QuantileMethod::from_str("midpoint"), QuantileMethod::Midpoint);
        assert_eq!(QuantileMethod::from_str("invalid"), QuantileMethod::Linear);
    }

    #[test]
    fn test_empty_grid_policy_from_str() {
        assert_eq!(EmptyGridPolicy::from_str("nodata"), EmptyGridPolicy::NoData);
        assert_eq!(EmptyGridPolicy::from_str("ERROR"), EmptyGridPolicy::Error);
        assert_eq!(EmptyGridPolicy::from_str("whatever"), EmptyGridPolicy::Error);
    }

    #[test]
    fn test_report_residual() {
        let report = ConservationReport {
            orig_sum: 437.6,
            output_sum: 438,
            ..Default::default()
        };
        assert!((report.residual() - 0.4).abs() < 1e-9);
    }
}
