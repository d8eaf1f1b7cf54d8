//! Configuration for count-conserving resampling.

use serde::{Deserialize, Serialize};
use worldpop_common::IntDataType;

use crate::types::{EmptyGridPolicy, QuantileMethod};

/// Linear factor between WorldPop's ~100m input cells and ~1km output cells.
pub const DEFAULT_DOWNSAMPLE_FACTOR: usize = 10;

/// Output sentinel. The source sentinel (-99999) does not fit in 16 bits.
pub const DEFAULT_OUTPUT_NODATA: i32 = -9999;

/// Configuration for the raster conserver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConserveConfig {
    /// Linear downsampling factor; output size is `floor(input / factor)`.
    pub downsample_factor: usize,

    /// Integer type of the output raster.
    pub output_type: IntDataType,

    /// No-data sentinel written to missing output cells.
    pub output_nodata: i32,

    /// Quantile estimator used by the rounding repair.
    pub quantile_method: QuantileMethod,

    /// Behaviour for input grids without any valid cell.
    pub empty_grid: EmptyGridPolicy,
}

impl Default for ConserveConfig {
    fn default() -> Self {
        Self {
            downsample_factor: DEFAULT_DOWNSAMPLE_FACTOR,
            output_type: IntDataType::Int16,
            output_nodata: DEFAULT_OUTPUT_NODATA,
            quantile_method: QuantileMethod::Linear,
            empty_grid: EmptyGridPolicy::Error,
        }
    }
}

impl ConserveConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CONSERVE_DOWNSAMPLE_FACTOR") {
            if let Ok(factor) = val.parse() {
                config.downsample_factor = factor;
            }
        }

        if let Ok(val) = std::env::var("CONSERVE_OUTPUT_TYPE") {
            if let Some(data_type) = IntDataType::from_str(&val) {
                config.output_type = data_type;
            }
        }

        if let Ok(val) = std::env::var("CONSERVE_OUTPUT_NODATA") {
            if let Ok(nodata) = val.parse() {
                config.output_nodata = nodata;
            }
        }

        if let Ok(val) = std::env::var("CONSERVE_QUANTILE_METHOD") {
            config.quantile_method = QuantileMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("CONSERVE_EMPTY_GRID") {
            config.empty_grid = EmptyGridPolicy::from_str(&val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.downsample_factor == 0 {
            return Err("downsample_factor must be > 0".to_string());
        }

        if !self.output_type.can_hold(self.output_nodata as i64) {
            return Err(format!(
                "output_nodata {} does not fit in {}",
                self.output_nodata, self.output_type
            ));
        }

        Ok(())
    }

    /// Output dimensions for an input of `width x height`.
    pub fn target_size(&self, width: usize, height: usize) -> (usize, usize) {
        let factor = self.downsample_factor.max(1);
        (width / factor, height / factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConserveConfig::default();
        assert_eq!(config.downsample_factor, 10);
        assert_eq!(config.output_type, IntDataType::Int16);
        assert_eq!(config.output_nodata, -9999);
        assert_eq!(config.quantile_method, QuantileMethod::Linear);
        assert_eq!(config.empty_grid, EmptyGridPolicy::Error);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ConserveConfig::default();
        assert!(config.validate().is_ok());

        config.downsample_factor = 0;
        assert!(config.validate().is_err());

        config = ConserveConfig::default();
        config.output_nodata = -99999;
        assert!(config.validate().is_err());

        config.output_type = IntDataType::Int32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target_size_floors() {
        let config = ConserveConfig::default();
        assert_eq!(config.target_size(105, 99), (10, 9));
        assert_eq!(config.target_size(9, 100), (0, 10));
    }

    #[test]
    fn test_config_deserializes_partial_yaml_like_json() {
        let config: ConserveConfig =
            serde_json::from_str(r#"{"output_type": "int32", "empty_grid": "nodata"}"#).unwrap();
        assert_eq!(config.output_type, IntDataType::Int32);
        assert_eq!(config.empty_grid, EmptyGridPolicy::NoData);
        assert_eq!(config.downsample_factor, 10);
    }
}
