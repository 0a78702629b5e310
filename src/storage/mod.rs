//! Object storage access for block metadata and bucket indexes
//! Uses Apache Arrow object_store crate

mod provider;

pub use provider::build_store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::{ObjectStore, path::Path as StoragePath, prefix::PrefixStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::ObjectStoreError(object_store::Error::NotFound { .. })
        )
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Attributes of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Read side of a (tenant-scoped) bucket
#[async_trait]
pub trait BucketReader: Send + Sync {
    /// Fetch object attributes without reading the object
    async fn attributes(&self, key: &str) -> Result<ObjectAttributes>;

    /// Read the whole object
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.attributes(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "blockyard-local".to_string(),
        }
    }

    /// Client whose keys are all relative to `prefix`
    pub fn scoped(&self, prefix: &str) -> Self {
        let prefix = StoragePath::from(prefix);
        Self {
            store: Arc::new(PrefixStore::new(Arc::clone(&self.store), prefix)),
            bucket: self.bucket.clone(),
        }
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = StoragePath::from(key);
        let size = data.len();

        self.store.put(&path, data.into()).await?;

        tracing::debug!(key, size, "Uploaded to storage");
        Ok(())
    }

    /// Names of the top-level prefixes, one per tenant
    pub async fn list_tenants(&self) -> Result<Vec<String>> {
        let listing = self.store.list_with_delimiter(None).await?;

        let mut tenants: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.parts().last().map(|part| part.as_ref().to_string()))
            .collect();
        tenants.sort();
        Ok(tenants)
    }
}

#[async_trait]
impl BucketReader for StorageClient {
    async fn attributes(&self, key: &str) -> Result<ObjectAttributes> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(meta) => Ok(ObjectAttributes {
                size: meta.size,
                last_modified: meta.last_modified,
            }),
            Err(object_store::Error::NotFound { .. }) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");
        Ok(bytes)
    }
}
