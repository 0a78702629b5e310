use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::Write;
use thiserror::Error;

use super::index::BucketIndex;
use super::tenant::TenantConfigProvider;
use crate::storage::{BucketReader, StorageClient, StorageError};

/// Object name of the index, relative to the tenant prefix
pub const INDEX_COMPRESSED_FILENAME: &str = "bucket-index.json.gz";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("bucket index not found")]
    NotFound,

    #[error("bucket index corrupted: {0}")]
    Corrupted(String),

    #[error("read bucket index: {0}")]
    Read(#[source] StorageError),

    #[error("write bucket index: {0}")]
    Write(String),
}

fn index_key(tenant: &str, provider: &dyn TenantConfigProvider) -> String {
    format!("{}/{}", provider.tenant_prefix(tenant), INDEX_COMPRESSED_FILENAME)
}

/// Read and validate a tenant's bucket index from the root bucket
pub async fn read_index(
    bucket: &dyn BucketReader,
    tenant: &str,
    provider: &dyn TenantConfigProvider,
) -> Result<BucketIndex, IndexError> {
    let key = index_key(tenant, provider);

    let raw = match bucket.get(&key).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => return Err(IndexError::NotFound),
        Err(e) => return Err(IndexError::Read(e)),
    };

    let index: BucketIndex = serde_json::from_reader(GzDecoder::new(raw.as_ref()))
        .map_err(|e| IndexError::Corrupted(e.to_string()))?;
    index.validate().map_err(IndexError::Corrupted)?;

    tracing::debug!(tenant, key, blocks = index.blocks.len(), "Read bucket index");
    Ok(index)
}

/// Serialize and upload a tenant's bucket index
pub async fn write_index(
    bucket: &StorageClient,
    tenant: &str,
    provider: &dyn TenantConfigProvider,
    index: &BucketIndex,
) -> Result<(), IndexError> {
    let json = serde_json::to_vec(index).map_err(|e| IndexError::Write(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| IndexError::Write(e.to_string()))?;
    let compressed = encoder.finish().map_err(|e| IndexError::Write(e.to_string()))?;

    let key = index_key(tenant, provider);
    bucket
        .upload(&key, compressed)
        .await
        .map_err(|e| IndexError::Write(e.to_string()))
}
