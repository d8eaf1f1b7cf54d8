//! Object storage for processed rasters (MinIO/S3 compatible).

use std::path::Path as LocalPath;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use worldpop_common::{PopError, PopResult};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "worldpop".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl ObjectStorageConfig {
    /// Load from `S3_*` environment variables, falling back to local MinIO values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("S3_ENDPOINT").unwrap_or(defaults.endpoint),
            bucket: std::env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            access_key_id: std::env::var("S3_ACCESS_KEY").unwrap_or(defaults.access_key_id),
            secret_access_key: std::env::var("S3_SECRET_KEY")
                .unwrap_or(defaults.secret_access_key),
            region: std::env::var("S3_REGION").unwrap_or(defaults.region),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.allow_http),
        }
    }
}

/// Result of an idempotent upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadOutcome {
    /// The object was written.
    Uploaded,
    /// The key already existed and the upload was not forced.
    Skipped,
}

/// Object storage client for WorldPop rasters.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> PopResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| PopError::StorageError(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store, e.g. `object_store::memory::InMemory` in tests.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a key in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, key = %key))]
    pub async fn put(&self, key: &str, data: Bytes) -> PopResult<()> {
        let location = Path::from(key);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to write {}: {}", key, e)))?;

        Ok(())
    }

    /// Read an object fully into memory.
    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    pub async fn get(&self, key: &str) -> PopResult<Bytes> {
        let location = Path::from(key);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to read {}: {}", key, e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> PopResult<bool> {
        let location = Path::from(key);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(PopError::StorageError(format!(
                "Failed to check {}: {}",
                key, e
            ))),
        }
    }

    /// List keys under a prefix, sorted.
    pub async fn list(&self, prefix: &str) -> PopResult<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let mut keys = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| PopError::StorageError(format!("List failed: {}", e)))?
        {
            keys.push(meta.location.to_string());
        }

        keys.sort();
        Ok(keys)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    pub async fn delete(&self, key: &str) -> PopResult<()> {
        let location = Path::from(key);

        self.store
            .delete(&location)
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to delete {}: {}", key, e)))?;

        Ok(())
    }

    /// Upload a local file unless `key` already exists.
    #[instrument(skip(self, local), fields(bucket = %self.bucket, key = %key))]
    pub async fn upload_file(
        &self,
        local: &LocalPath,
        key: &str,
        force: bool,
    ) -> PopResult<UploadOutcome> {
        if !force && self.exists(key).await? {
            info!("Object already exists, skipping upload");
            return Ok(UploadOutcome::Skipped);
        }

        let data = tokio::fs::read(local).await.map_err(|e| {
            PopError::StorageError(format!("Failed to read {}: {}", local.display(), e))
        })?;
        self.put(key, Bytes::from(data)).await?;

        info!(local = %local.display(), "Uploaded file");
        Ok(UploadOutcome::Uploaded)
    }

    /// Stream an object to a local file, creating parent directories.
    #[instrument(skip(self, local), fields(bucket = %self.bucket, key = %key))]
    pub async fn download_file(&self, key: &str, local: &LocalPath) -> PopResult<u64> {
        let location = Path::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to read {}: {}", key, e)))?;

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local).await?;

        let mut written = 0u64;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| PopError::StorageError(format!("Failed to read {}: {}", key, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(local = %local.display(), size = written, "Downloaded object");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn storage() -> ObjectStorage {
        ObjectStorage::from_store(Arc::new(InMemory::new()), "test")
    }

    #[test]
    fn test_default_config_is_local_minio() {
        let config = ObjectStorageConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.allow_http);
    }

    #[tokio::test]
    async fn test_put_get_exists_delete() {
        let storage = storage();
        let key = "2020/nga/nga_f_0_2020.tif";

        assert!(!storage.exists(key).await.unwrap());
        storage.put(key, Bytes::from_static(b"raster")).await.unwrap();
        assert!(storage.exists(key).await.unwrap());
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"raster"));

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_prefix() {
        let storage = storage();
        for key in ["2020/nga/b.tif", "2020/nga/a.tif", "2020/ken/a.tif", "2015/nga/a.tif"] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let keys = storage.list("2020/nga").await.unwrap();
        assert_eq!(keys, vec!["2020/nga/a.tif", "2020/nga/b.tif"]);
    }

    #[tokio::test]
    async fn test_upload_file_skips_existing_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nga_m_5_2020.tif");
        tokio::fs::write(&local, b"first").await.unwrap();

        let storage = storage();
        let key = "2020/nga/nga_m_5_2020.tif";

        assert_eq!(
            storage.upload_file(&local, key, false).await.unwrap(),
            UploadOutcome::Uploaded
        );

        tokio::fs::write(&local, b"second").await.unwrap();
        assert_eq!(
            storage.upload_file(&local, key, false).await.unwrap(),
            UploadOutcome::Skipped
        );
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"first"));

        assert_eq!(
            storage.upload_file(&local, key, true).await.unwrap(),
            UploadOutcome::Uploaded
        );
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_download_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage();
        storage
            .put("2020/nga/a.tif", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let local = dir.path().join("work/2020/a.tif");
        let size = storage.download_file("2020/nga/a.tif", &local).await.unwrap();
        assert_eq!(size, 7);
        assert_eq!(tokio::fs::read(&local).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_error() {
        let storage = storage();
        assert!(matches!(
            storage.get("nope.tif").await,
            Err(PopError::StorageError(_))
        ));
    }
}
