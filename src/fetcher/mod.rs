//! Per-tenant block metadata fetcher
//!
//! [`MetadataFetcher`] loads a tenant's bucket index, rebuilds the block
//! metas it describes and threads them through an ordered chain of
//! [`Filter`]s. A missing or corrupted index is not an error: the tenant is
//! reported as having no blocks and the outcome is tagged in the
//! `blocks_meta_synced` gauge.

pub mod filters;
pub mod metrics;

pub use filters::{
    BlockMetas, DeduplicateFilter, Filter, FilterError, IgnoreDeletionMarkFilter, IndexAwareFilter,
    MetadataFilter, MinTimeMetaFilter, OutOfOrderFilter, RetentionFilter,
};
pub use metrics::{FetcherMetrics, TxGaugeVec};

use prometheus::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::block::BlockId;
use crate::bucketindex::{read_index, IndexError, TenantConfigProvider};
use crate::config::FetcherConfig;
use crate::storage::{BucketReader, StorageError};
use self::metrics::{CORRUPTED_BUCKET_INDEX, FAILED_META, LOADED_META, NO_BUCKET_INDEX};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("read bucket index: {0}")]
    ReadIndex(#[source] IndexError),

    #[error("filter metas: {0}")]
    Filter(#[source] FilterError),

    #[error("fetch cancelled")]
    Cancelled,
}

/// How the bucket index lookup ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    NoBucketIndex,
    CorruptedBucketIndex,
}

/// Result of one successful fetch
#[derive(Debug)]
pub struct FetchOutput {
    pub metas: BlockMetas,
    /// Per-block failures. Never populated by the index-backed fetcher.
    pub partial: HashMap<BlockId, StorageError>,
    pub outcome: FetchOutcome,
}

impl FetchOutput {
    fn empty(outcome: FetchOutcome) -> Self {
        Self {
            metas: HashMap::new(),
            partial: HashMap::new(),
            outcome,
        }
    }
}

/// Fetches one tenant's block metas from its bucket index.
///
/// `fetch` takes `&mut self`, so a fetcher is single-flight by construction.
pub struct MetadataFetcher {
    tenant: String,
    bucket: Arc<dyn BucketReader>,
    provider: Arc<dyn TenantConfigProvider>,
    filters: Vec<Filter>,
    metrics: FetcherMetrics,
}

#[bon::bon]
impl MetadataFetcher {
    /// Registers the fetcher metrics into `registry`, which is usually the
    /// tenant's own registry.
    #[builder]
    pub fn new(
        #[builder(into)] tenant: String,
        bucket: Arc<dyn BucketReader>,
        provider: Arc<dyn TenantConfigProvider>,
        #[builder(default)] filters: Vec<Filter>,
        registry: &Registry,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            tenant,
            bucket,
            provider,
            filters,
            metrics: FetcherMetrics::new(registry)?,
        })
    }
}

impl MetadataFetcher {
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn metrics(&self) -> &FetcherMetrics {
        &self.metrics
    }

    /// Load the bucket index and apply the filter chain.
    ///
    /// Gauges are reset at the start and published on every return path.
    pub async fn fetch(&mut self, cancel: &CancellationToken) -> Result<FetchOutput, FetchError> {
        self.metrics.reset_tx();
        self.metrics.syncs.inc();
        let start = Instant::now();

        let result = self.fetch_index(cancel).await;

        self.metrics.sync_duration.observe(start.elapsed().as_secs_f64());
        if result.is_err() {
            self.metrics.sync_failures.inc();
        }
        self.metrics.submit();

        result
    }

    async fn fetch_index(&self, cancel: &CancellationToken) -> Result<FetchOutput, FetchError> {
        let synced = &self.metrics.synced;

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            read = read_index(self.bucket.as_ref(), &self.tenant, self.provider.as_ref()) => read,
        };

        let index = match read {
            Ok(index) => index,
            Err(IndexError::NotFound) => {
                // Tenants with freshly uploaded blocks have no index yet.
                synced.set(NO_BUCKET_INDEX, 1.0);
                return Ok(FetchOutput::empty(FetchOutcome::NoBucketIndex));
            }
            Err(e @ IndexError::Corrupted(_)) => {
                error!(tenant = %self.tenant, error = %e, "Corrupted bucket index found");
                synced.set(CORRUPTED_BUCKET_INDEX, 1.0);
                return Ok(FetchOutput::empty(FetchOutcome::CorruptedBucketIndex));
            }
            Err(e) => {
                synced.set(FAILED_META, 1.0);
                return Err(FetchError::ReadIndex(e));
            }
        };

        info!(
            tenant = %self.tenant,
            updated_at = %index.updated_at,
            blocks = index.blocks.len(),
            "Loaded bucket index"
        );

        let mut metas: BlockMetas = index
            .blocks
            .iter()
            .map(|b| (b.block_id, Arc::new(b.to_meta())))
            .collect();

        for filter in &self.filters {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            filter
                .apply(&mut metas, &index, synced)
                .await
                .map_err(FetchError::Filter)?;
        }

        synced.set(LOADED_META, metas.len() as f64);
        Ok(FetchOutput {
            metas,
            partial: HashMap::new(),
            outcome: FetchOutcome::Loaded,
        })
    }
}

/// Filter chain configured by the `[fetcher]` section, in evaluation order
pub fn default_filters(config: &FetcherConfig) -> Vec<Filter> {
    let mut filters = vec![
        Filter::basic(MinTimeMetaFilter::new(config.min_time_limit.as_duration())),
        Filter::basic(RetentionFilter::new(config.retention.as_duration())),
        Filter::index_aware(IgnoreDeletionMarkFilter::new(config.deletion_delay.as_duration())),
    ];
    if config.exclude_out_of_order {
        filters.push(Filter::basic(OutOfOrderFilter));
    }
    if config.deduplicate {
        filters.push(Filter::basic(DeduplicateFilter::new()));
    }
    filters
}
