//! Component factory for environment-based configuration
//!
//! Builds the object store and the [`ObservationStore`] on top of it from a
//! [`StorageConfig`], or from environment variables so binaries can switch
//! between development and production storage without code changes.

use crate::store::{ObservationStore, ParquetStore};
use crate::{Error, Result, StorageBackend, StorageConfig};

use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, ObjectStore};
use std::sync::Arc;
use tracing::info;

pub struct ComponentFactory;

impl ComponentFactory {
    /// Read storage settings from the environment.
    ///
    /// Environment variables:
    /// - STORAGE_BACKEND: "memory" (default), "local" or "s3"
    /// - STORAGE_LOCATION: root directory (local) or bucket name (s3)
    /// - STORAGE_PREFIX: key prefix inside the location (default: kpi-ledger)
    pub fn storage_config_from_env() -> Result<StorageConfig> {
        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(raw) => raw.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::Memory,
        };
        let location = std::env::var("STORAGE_LOCATION")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let prefix = std::env::var("STORAGE_PREFIX")
            .unwrap_or_else(|_| StorageConfig::default().prefix);

        Ok(StorageConfig {
            backend,
            location,
            prefix,
        })
    }

    /// Create the object store described by `config`.
    ///
    /// For S3 the following are also read from the environment:
    /// - S3_REGION: S3 region (default: us-east-1)
    /// - S3_ENDPOINT: Custom S3 endpoint (optional, for MinIO)
    /// - AWS_ACCESS_KEY_ID: AWS credentials (optional, uses IAM role if not set)
    /// - AWS_SECRET_ACCESS_KEY: AWS credentials (optional)
    pub async fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory object store (development mode)");
                Ok(Arc::new(InMemory::new()))
            }
            StorageBackend::Local => {
                let root = config.require_location()?;
                tokio::fs::create_dir_all(root).await?;
                info!(root = %root, "Using local filesystem object store");
                let store = LocalFileSystem::new_with_prefix(root)
                    .map_err(|e| Error::Config(format!("Invalid local storage root {}: {}", root, e)))?;
                Ok(Arc::new(store))
            }
            StorageBackend::S3 => {
                let bucket = config.require_location()?;
                let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

                info!(bucket = %bucket, region = %region, "Using S3 object store");

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(&region);

                // Custom endpoints (MinIO, LocalStack)
                if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
                    info!(endpoint = %endpoint, "Using custom S3 endpoint");
                    builder = builder.with_endpoint(&endpoint).with_allow_http(true);
                }

                // Explicit credentials if provided, otherwise the IAM role
                if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
                    builder = builder.with_access_key_id(&key);
                }
                if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                    builder = builder.with_secret_access_key(&secret);
                }

                let store = builder
                    .build()
                    .map_err(|e| Error::Config(format!("Invalid S3 configuration: {}", e)))?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Create a Parquet-backed observation store for `config`.
    pub async fn create_parquet_store(config: &StorageConfig) -> Result<Arc<ParquetStore>> {
        let object_store = Self::create_object_store(config).await?;
        info!(
            backend = config.backend.as_str(),
            prefix = %config.prefix,
            "Opening observation store"
        );
        Ok(Arc::new(ParquetStore::new(object_store, config.prefix.clone())?))
    }

    /// Create the observation store for `config`.
    pub async fn create_observation_store(
        config: &StorageConfig,
    ) -> Result<Arc<dyn ObservationStore>> {
        let store: Arc<dyn ObservationStore> = Self::create_parquet_store(config).await?;
        Ok(store)
    }
}
