use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;

use super::{Result, StorageClient, StorageError};
use crate::config::{StorageConfig, StorageProvider};

/// Build a storage client for the configured provider
pub fn build_store(config: &StorageConfig) -> Result<StorageClient> {
    let store: Arc<dyn ObjectStore> = match config.provider {
        StorageProvider::Memory => Arc::new(InMemory::new()),
        StorageProvider::Filesystem => {
            std::fs::create_dir_all(&config.root).map_err(|e| {
                StorageError::InvalidConfig(format!("{}: {}", config.root.display(), e))
            })?;
            Arc::new(LocalFileSystem::new_with_prefix(&config.root)?)
        }
        StorageProvider::S3 => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
            if let Some(region) = &config.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &config.endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(endpoint.starts_with("http://"));
            }
            if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
                builder = builder
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key);
            }
            Arc::new(builder.build()?)
        }
    };

    tracing::info!(provider = ?config.provider, bucket = %config.bucket, "Object store initialised");
    Ok(StorageClient::new(store, config.bucket.clone()))
}
