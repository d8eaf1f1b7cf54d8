//! Pipeline configuration.
//!
//! Loaded from the environment (`WORLDPOP_*`, `DATABASE_URL`,
//! `DEV_DATABASE_URL`, `S3_*`, `CONSERVE_*`) or from a YAML file.

use std::path::{Path, PathBuf};

use grid_processor::{ConserveConfig, EmptyGridPolicy};
use serde::{Deserialize, Serialize};
use storage::{ObjectStorageConfig, TileInsertOptions, DEFAULT_SRID, DEFAULT_TILE_SIZE};
use worldpop_common::is_valid_iso3;

use crate::error::{IngestionError, Result};

/// Public HTTPS mirror of the WorldPop age/sex structures.
pub const DEFAULT_SOURCE_URL: &str =
    "https://data.worldpop.org/GIS/AgeSex_structures/Global_2000_2020";

/// First year WorldPop publishes age/sex structures for.
pub const FIRST_YEAR: u32 = 2000;

/// One PostGIS database the pipeline writes tiles into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseTarget {
    /// Label used in logs.
    pub name: String,
    pub url: String,
    /// Cast tiles to 32-bit on insertion.
    #[serde(default)]
    pub cast_to_int32: bool,
}

impl DatabaseTarget {
    /// Production database: tiles are standardized and cast to `32BSI`.
    pub fn production(url: impl Into<String>) -> Self {
        Self {
            name: "production".to_string(),
            url: url.into(),
            cast_to_int32: true,
        }
    }

    /// Development database: tiles are only standardized.
    pub fn development(url: impl Into<String>) -> Self {
        Self {
            name: "development".to_string(),
            url: url.into(),
            cast_to_int32: false,
        }
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// ISO3 country code.
    pub country: String,
    pub year: u32,

    /// Base URL of the HTTPS mirror.
    pub source_url: String,

    /// Read source rasters from this directory instead of the mirror.
    pub source_dir: Option<PathBuf>,

    /// Scratch directory for downloaded rasters.
    pub work_dir: PathBuf,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Tile edge length for catalog inserts.
    pub tile_size: usize,

    pub srid: i32,

    /// Reprocess and overwrite rasters already in the store.
    pub force: bool,

    pub databases: Vec<DatabaseTarget>,

    pub storage: ObjectStorageConfig,

    pub conserve: ConserveConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            country: String::new(),
            year: 2020,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            source_dir: None,
            work_dir: std::env::temp_dir().join("worldpop"),
            request_timeout_secs: 600,
            tile_size: DEFAULT_TILE_SIZE,
            srid: DEFAULT_SRID,
            force: false,
            databases: Vec::new(),
            storage: ObjectStorageConfig::default(),
            conserve: ConserveConfig {
                empty_grid: EmptyGridPolicy::NoData,
                ..Default::default()
            },
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORLDPOP_COUNTRY") {
            config.country = val;
        }
        if let Ok(val) = std::env::var("WORLDPOP_YEAR") {
            if let Ok(year) = val.parse() {
                config.year = year;
            }
        }
        if let Ok(val) = std::env::var("WORLDPOP_SOURCE_URL") {
            config.source_url = val;
        }
        if let Ok(val) = std::env::var("WORLDPOP_SOURCE_DIR") {
            config.source_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("WORLDPOP_WORK_DIR") {
            config.work_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("WORLDPOP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.request_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("WORLDPOP_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_size = size;
            }
        }
        if let Ok(val) = std::env::var("WORLDPOP_SRID") {
            if let Ok(srid) = val.parse() {
                config.srid = srid;
            }
        }
        if let Ok(val) = std::env::var("WORLDPOP_FORCE") {
            config.force = val == "true" || val == "1";
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.databases.push(DatabaseTarget::production(url));
        }
        if let Ok(url) = std::env::var("DEV_DATABASE_URL") {
            config.databases.push(DatabaseTarget::development(url));
        }

        config.storage = ObjectStorageConfig::from_env();

        let mut conserve = ConserveConfig::from_env();
        if std::env::var("CONSERVE_EMPTY_GRID").is_err() {
            conserve.empty_grid = EmptyGridPolicy::NoData;
        }
        config.conserve = conserve;

        config
    }

    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            IngestionError::InvalidConfig(msg) => {
                IngestionError::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| IngestionError::InvalidConfig(e.to_string()))
    }

    /// Check the fields a run depends on.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_iso3(&self.country) {
            return Err(IngestionError::InvalidConfig(format!(
                "country must be an ISO3 code, got '{}'",
                self.country
            )));
        }
        if self.year < FIRST_YEAR {
            return Err(IngestionError::InvalidConfig(format!(
                "year must be {} or later, got {}",
                FIRST_YEAR, self.year
            )));
        }
        if self.tile_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "tile_size must be positive".to_string(),
            ));
        }
        self.conserve.validate().map_err(IngestionError::InvalidConfig)?;
        Ok(())
    }

    /// Insert options for one database target.
    pub fn insert_options(&self, target: &DatabaseTarget) -> TileInsertOptions {
        TileInsertOptions {
            tile_size: self.tile_size,
            srid: self.srid,
            cast_to_int32: target.cast_to_int32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(config.tile_size, 400);
        assert_eq!(config.srid, 4326);
        assert_eq!(config.conserve.empty_grid, EmptyGridPolicy::NoData);
        assert!(config.databases.is_empty());
    }

    #[test]
    fn test_validate() {
        let mut config = PipelineConfig {
            country: "NGA".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.country = "NG".to_string();
        assert!(config.validate().is_err());

        config.country = "nga".to_string();
        config.year = 1999;
        assert!(config.validate().is_err());

        config.year = 2015;
        config.tile_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
country: KEN
year: 2015
force: true
tile_size: 200
databases:
  - name: production
    url: postgres://localhost/worldpop
    cast_to_int32: true
  - name: development
    url: postgres://localhost/worldpop_dev
conserve:
  output_type: int32
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.country, "KEN");
        assert_eq!(config.year, 2015);
        assert!(config.force);
        assert_eq!(config.databases.len(), 2);
        assert!(!config.databases[1].cast_to_int32);
        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);

        let options = config.insert_options(&config.databases[0]);
        assert_eq!(options.tile_size, 200);
        assert!(options.cast_to_int32);
    }

    #[test]
    fn test_from_yaml_str_rejects_bad_types() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("year: soon"),
            Err(IngestionError::InvalidConfig(_))
        ));
    }
}
