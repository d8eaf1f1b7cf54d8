//! End-to-end processing of one country and year.
//!
//! For every source raster: skip it if the store already has it, otherwise
//! fetch it into the work directory, conserve it in place, insert its tiles
//! into each database target, upload it and delete the local copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use grid_processor::{conserve_file_to_grid, read_int_grid, Conserved, RasterConserver};
use serde::Serialize;
use storage::{ObjectStorage, TileCatalog, TileInsertOptions, UploadOutcome};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;
use worldpop_common::{is_valid_iso3, storage_prefix, IntGrid, RasterFileInfo};

use crate::config::PipelineConfig;
use crate::error::{IngestionError, Result};
use crate::source::{HttpSource, LocalDirSource, RasterSource, RemoteRaster};

/// A connected database and how tiles are written into it.
pub struct CatalogTarget {
    pub catalog: TileCatalog,
    pub options: TileInsertOptions,
}

/// What happened to one raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterOutcome {
    /// Conserved and stored; `tiles` rows were written across all targets.
    Processed { tiles: usize },
    /// Already present, or not for the requested country and year.
    Skipped,
}

/// A raster that failed, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRaster {
    pub name: String,
    pub error: String,
}

/// Counters for one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub tiles_inserted: usize,
    pub failures: Vec<FailedRaster>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            processed: 0,
            skipped: 0,
            failed: 0,
            tiles_inserted: 0,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn record(&mut self, name: &str, result: Result<RasterOutcome>) {
        match result {
            Ok(RasterOutcome::Processed { tiles }) => {
                self.processed += 1;
                self.tiles_inserted += tiles;
            }
            Ok(RasterOutcome::Skipped) => self.skipped += 1,
            Err(e) => {
                error!(name = %name, error = %e, "Raster failed");
                self.failed += 1;
                self.failures.push(FailedRaster {
                    name: name.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// True when nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// The WorldPop processing pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn RasterSource>,
    storage: ObjectStorage,
    catalogs: Vec<CatalogTarget>,
    conserver: RasterConserver,
}

impl Pipeline {
    /// Assemble a pipeline from already-built parts.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn RasterSource>,
        storage: ObjectStorage,
        catalogs: Vec<CatalogTarget>,
    ) -> Result<Self> {
        let conserver = RasterConserver::new(config.conserve.clone())?;
        Ok(Self {
            config,
            source,
            storage,
            catalogs,
            conserver,
        })
    }

    /// Build the source, storage client and database connections described by `config`.
    ///
    /// Every database target is migrated before it is used.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let source: Arc<dyn RasterSource> = match &config.source_dir {
            Some(dir) => Arc::new(LocalDirSource::new(dir)),
            None => Arc::new(HttpSource::new(
                config.source_url.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )?),
        };

        let storage = ObjectStorage::new(&config.storage)?;

        let mut catalogs = Vec::with_capacity(config.databases.len());
        for target in &config.databases {
            let catalog = TileCatalog::connect(&target.name, &target.url).await?;
            catalog.migrate().await?;
            info!(db = %target.name, cast_to_int32 = target.cast_to_int32, "Connected to database");
            catalogs.push(CatalogTarget {
                catalog,
                options: config.insert_options(target),
            });
        }

        Self::new(config, source, storage, catalogs)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    /// Process every source raster of one country and year.
    ///
    /// Per-raster failures are logged and counted; only listing errors abort
    /// the run.
    #[instrument(skip(self), fields(force = self.config.force))]
    pub async fn run(&self, country: &str, year: u32) -> Result<PipelineSummary> {
        check_country(country)?;

        let rasters = self.source.list(country, year).await?;
        if rasters.is_empty() {
            warn!("No source rasters found");
        }

        let mut summary = PipelineSummary::start();
        for raster in &rasters {
            let result = self.process_raster(raster).await;
            summary.record(&raster.name, result);
        }

        let summary = summary.finish();
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            tiles = summary.tiles_inserted,
            duration_secs = summary.duration_secs(),
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Fetch, conserve, insert and upload one raster.
    #[instrument(skip(self, raster), fields(name = %raster.name))]
    pub async fn process_raster(&self, raster: &RemoteRaster) -> Result<RasterOutcome> {
        let info = RasterFileInfo::parse(&raster.name)?;
        let key = info.storage_key();

        if !self.config.force && self.storage.exists(&key).await? {
            info!(key = %key, "Already in storage, skipping");
            return Ok(RasterOutcome::Skipped);
        }

        let local = self.local_path(&info);
        let result = self.process_local(raster, &info, &key, &local).await;
        remove_local(&local).await;

        result.map(|tiles| RasterOutcome::Processed { tiles })
    }

    async fn process_local(
        &self,
        raster: &RemoteRaster,
        info: &RasterFileInfo,
        key: &str,
        local: &Path,
    ) -> Result<usize> {
        let size = self.source.fetch(raster, local).await?;
        debug!(size, local = %local.display(), "Fetched raster");

        let conserved = self.conserve(local.to_path_buf()).await?;
        let tiles = self.insert_tiles(info, &conserved.grid).await?;

        match self.storage.upload_file(local, key, self.config.force).await? {
            UploadOutcome::Uploaded => {}
            UploadOutcome::Skipped => warn!(key = %key, "Object appeared during processing"),
        }

        Ok(tiles)
    }

    /// Conserve a local raster in place on the blocking pool.
    async fn conserve(&self, path: PathBuf) -> Result<Conserved> {
        let conserver = self.conserver.clone();
        let task = tokio::task::spawn_blocking(move || conserve_file_to_grid(&path, &path, &conserver));

        let conserved = task
            .await
            .map_err(|e| anyhow::anyhow!("conservation task failed: {}", e))??;
        Ok(conserved)
    }

    async fn insert_tiles(&self, info: &RasterFileInfo, grid: &IntGrid) -> Result<usize> {
        let mut total = 0;
        for target in &self.catalogs {
            total += target
                .catalog
                .insert_raster(info, grid, &target.options)
                .await?;
        }
        Ok(total)
    }

    /// Insert tiles for rasters that are already in the store.
    ///
    /// Lists `{year}/{iso3}/`, downloads each `.tif` and inserts it into every
    /// database target. Keys that do not parse to the requested country and
    /// year are skipped.
    #[instrument(skip(self))]
    pub async fn insert_from_storage(&self, country: &str, year: u32) -> Result<PipelineSummary> {
        check_country(country)?;
        if self.catalogs.is_empty() {
            warn!("No database targets configured, rasters will only be read");
        }

        let keys = self.storage.list(&storage_prefix(country, year)).await?;
        let keys: Vec<&String> = keys
            .iter()
            .filter(|k| k.to_lowercase().ends_with(".tif"))
            .collect();
        info!(count = keys.len(), "Listed stored rasters");

        let mut summary = PipelineSummary::start();
        for key in keys {
            let result = self.insert_stored(key, country, year).await;
            summary.record(key, result);
        }

        let summary = summary.finish();
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            tiles = summary.tiles_inserted,
            "Insert from storage complete"
        );
        Ok(summary)
    }

    async fn insert_stored(&self, key: &str, country: &str, year: u32) -> Result<RasterOutcome> {
        let info = RasterFileInfo::parse(key)?;
        if info.iso3 != country.to_lowercase() || info.year != year {
            debug!(key = %key, "Key does not match country and year");
            return Ok(RasterOutcome::Skipped);
        }

        let local = self.local_path(&info);
        let result: Result<usize> = async {
            self.storage.download_file(key, &local).await?;
            let path = local.clone();
            let grid = tokio::task::spawn_blocking(move || read_int_grid(&path))
                .await
                .map_err(|e| anyhow::anyhow!("read task failed: {}", e))??;
            self.insert_tiles(&info, &grid).await
        }
        .await;
        remove_local(&local).await;

        result.map(|tiles| RasterOutcome::Processed { tiles })
    }

    /// Upload already-processed rasters from a local directory.
    ///
    /// Files are keyed by their parsed metadata; names that do not parse are
    /// ignored. Existing keys are skipped unless the pipeline is forced.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn upload_dir(&self, dir: &Path) -> Result<PipelineSummary> {
        if !dir.is_dir() {
            return Err(IngestionError::InvalidConfig(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut summary = PipelineSummary::start();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| IngestionError::Source(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(info) = RasterFileInfo::parse(&entry.path().to_string_lossy()) else {
                continue;
            };

            let result = self
                .storage
                .upload_file(entry.path(), &info.storage_key(), self.config.force)
                .await
                .map(|outcome| match outcome {
                    UploadOutcome::Uploaded => RasterOutcome::Processed { tiles: 0 },
                    UploadOutcome::Skipped => RasterOutcome::Skipped,
                })
                .map_err(IngestionError::from);
            summary.record(&info.file_name, result);
        }

        let summary = summary.finish();
        info!(
            uploaded = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Upload complete"
        );
        Ok(summary)
    }

    fn local_path(&self, info: &RasterFileInfo) -> PathBuf {
        self.config
            .work_dir
            .join(info.year.to_string())
            .join(&info.iso3)
            .join(&info.file_name)
    }
}

fn check_country(country: &str) -> Result<()> {
    if is_valid_iso3(country) {
        Ok(())
    } else {
        Err(IngestionError::InvalidConfig(format!(
            "country must be an ISO3 code, got '{}'",
            country
        )))
    }
}

async fn remove_local(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove local file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_records_outcomes() {
        let mut summary = PipelineSummary::start();
        summary.record("a.tif", Ok(RasterOutcome::Processed { tiles: 3 }));
        summary.record("b.tif", Ok(RasterOutcome::Processed { tiles: 2 }));
        summary.record("c.tif", Ok(RasterOutcome::Skipped));
        summary.record("d.tif", Err(IngestionError::Source("gone".to_string())));
        let summary = summary.finish();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.tiles_inserted, 5);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].name, "d.tif");
        assert!(!summary.is_success());
        assert!(summary.duration_secs() >= 0.0);
    }

    #[test]
    fn test_check_country() {
        assert!(check_country("NGA").is_ok());
        assert!(check_country("ken").is_ok());
        assert!(check_country("NG1").is_err());
        assert!(check_country("").is_err());
    }
}
