//! Where source rasters come from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use worldpop_common::{source_filenames, RasterFileInfo};

use crate::error::{IngestionError, Result};

/// Concurrent HEAD requests while probing the mirror.
const PROBE_CONCURRENCY: usize = 8;

/// Trait for sources that can list and fetch population rasters.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// List the rasters available for a country and year.
    async fn list(&self, iso3: &str, year: u32) -> Result<Vec<RemoteRaster>>;

    /// Copy one raster to `dest`, returning the number of bytes written.
    async fn fetch(&self, raster: &RemoteRaster, dest: &Path) -> Result<u64>;
}

/// A raster a source can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRaster {
    /// Basename, e.g. `nga_f_0_2020.tif`.
    pub name: String,
    /// URL or local path.
    pub location: String,
    pub size: Option<u64>,
}

/// WorldPop HTTPS mirror.
///
/// The mirror has no listing endpoint, so `list` probes every filename
/// WorldPop publishes for the country and year with a HEAD request.
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestionError::Source(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `{base}/{year}/{ISO3}/{name}`
    pub fn raster_url(&self, iso3: &str, year: u32, name: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, year, iso3.to_uppercase(), name)
    }

    async fn probe(&self, url: String, name: String) -> Result<Option<RemoteRaster>> {
        let response = self.client.head(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(Some(RemoteRaster {
                name,
                size: response.content_length(),
                location: url,
            }))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(IngestionError::Download {
                url,
                message: format!("HEAD returned {}", status),
            })
        }
    }
}

#[async_trait]
impl RasterSource for HttpSource {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn list(&self, iso3: &str, year: u32) -> Result<Vec<RemoteRaster>> {
        let candidates: Vec<(String, String)> = source_filenames(iso3, year)
            .into_iter()
            .map(|name| (self.raster_url(iso3, year, &name), name))
            .collect();

        let probed: Vec<Result<Option<RemoteRaster>>> = stream::iter(candidates)
            .map(|(url, name)| self.probe(url, name))
            .buffered(PROBE_CONCURRENCY)
            .collect()
            .await;

        let mut rasters = Vec::new();
        for result in probed {
            if let Some(raster) = result? {
                rasters.push(raster);
            }
        }

        info!(count = rasters.len(), "Listed source rasters");
        Ok(rasters)
    }

    #[instrument(skip(self, dest), fields(name = %raster.name))]
    async fn fetch(&self, raster: &RemoteRaster, dest: &Path) -> Result<u64> {
        let response = self.client.get(&raster.location).send().await?;

        if !response.status().is_success() {
            return Err(IngestionError::Download {
                url: raster.location.clone(),
                message: format!("GET returned {}", response.status()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = raster.size {
            if expected != written {
                return Err(IngestionError::Download {
                    url: raster.location.clone(),
                    message: format!("expected {} bytes, received {}", expected, written),
                });
            }
        }

        info!(size = written, "Downloaded raster");
        Ok(written)
    }
}

/// Rasters already on disk, e.g. a mirror synced by other means.
///
/// Any `.tif` below `root` whose name parses to the requested country and
/// year is listed.
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl RasterSource for LocalDirSource {
    async fn list(&self, iso3: &str, year: u32) -> Result<Vec<RemoteRaster>> {
        if !self.root.is_dir() {
            return Err(IngestionError::Source(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let iso3 = iso3.to_lowercase();
        let mut rasters = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| IngestionError::Source(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(info) = RasterFileInfo::parse(&path.to_string_lossy()) else {
                continue;
            };
            if info.iso3 != iso3 || info.year != year {
                continue;
            }

            rasters.push(RemoteRaster {
                name: info.file_name,
                location: path.to_string_lossy().into_owned(),
                size: entry.metadata().ok().map(|m| m.len()),
            });
        }

        debug!(root = %self.root.display(), count = rasters.len(), "Listed local rasters");
        Ok(rasters)
    }

    async fn fetch(&self, raster: &RemoteRaster, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::copy(&raster.location, dest).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_url_uses_uppercase_country_directory() {
        let source = HttpSource::new(
            "https://data.worldpop.org/GIS/AgeSex_structures/Global_2000_2020/",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            source.raster_url("nga", 2020, "nga_f_0_2020.tif"),
            "https://data.worldpop.org/GIS/AgeSex_structures/Global_2000_2020/2020/NGA/nga_f_0_2020.tif"
        );
    }

    #[tokio::test]
    async fn test_local_dir_lists_matching_rasters_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("NGA");
        std::fs::create_dir_all(&nested).unwrap();
        for name in [
            "nga_m_5_2020.tif",
            "nga_f_0_2020.tif",
            "nga_f_0_2015.tif",
            "ken_f_0_2020.tif",
            "readme.txt",
        ] {
            std::fs::write(nested.join(name), b"tiff").unwrap();
        }

        let source = LocalDirSource::new(dir.path());
        let rasters = source.list("NGA", 2020).await.unwrap();
        let names: Vec<&str> = rasters.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["nga_f_0_2020.tif", "nga_m_5_2020.tif"]);
        assert_eq!(rasters[0].size, Some(4));

        let dest = dir.path().join("work/copy.tif");
        assert_eq!(source.fetch(&rasters[0], &dest).await.unwrap(), 4);
        assert_eq!(std::fs::read(&dest).unwrap(), b"tiff");
    }

    #[tokio::test]
    async fn test_local_dir_missing_root_is_error() {
        let source = LocalDirSource::new("/nonexistent/worldpop");
        assert!(matches!(
            source.list("nga", 2020).await,
            Err(IngestionError::Source(_))
        ));
    }
}
