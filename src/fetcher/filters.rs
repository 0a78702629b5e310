//! Block metadata filters
//!
//! Filters remove entries from the fetched metadata map in place and
//! record the reason of every exclusion into the synced gauge. They come in
//! two flavours: [`MetadataFilter`] only sees the metas, while
//! [`IndexAwareFilter`] also receives the bucket index they were built from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use super::metrics::{
    DUPLICATE_META, MARKED_FOR_DELETION_META, MIN_TIME_EXCLUDED_META, OUT_OF_ORDER_EXCLUDED_META,
    RETENTION_EXPIRED_META, TxGaugeVec,
};
use crate::block::{BlockId, BlockMeta, INGESTER_SOURCE};
use crate::bucketindex::{BlockDeletionMark, BucketIndex};
use crate::storage::StorageError;

/// Fetched metadata, keyed by block
pub type BlockMetas = HashMap<BlockId, Arc<BlockMeta>>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{filter}: {source}")]
    Storage {
        filter: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("{filter}: {message}")]
    Failed { filter: &'static str, message: String },
}

/// Filter over the fetched metas only
#[async_trait]
pub trait MetadataFilter: Send + Sync {
    async fn filter(&self, metas: &mut BlockMetas, synced: &TxGaugeVec) -> Result<(), FilterError>;
}

/// Filter that also needs the bucket index the metas came from
#[async_trait]
pub trait IndexAwareFilter: Send + Sync {
    async fn filter_with_index(
        &self,
        metas: &mut BlockMetas,
        index: &BucketIndex,
        synced: &TxGaugeVec,
    ) -> Result<(), FilterError>;
}

/// A registered filter, tagged with the contract it implements
#[derive(Clone)]
pub enum Filter {
    Basic(Arc<dyn MetadataFilter>),
    IndexAware(Arc<dyn IndexAwareFilter>),
}

impl Filter {
    pub fn basic(filter: impl MetadataFilter + 'static) -> Self {
        Filter::Basic(Arc::new(filter))
    }

    pub fn index_aware(filter: impl IndexAwareFilter + 'static) -> Self {
        Filter::IndexAware(Arc::new(filter))
    }

    pub(crate) async fn apply(
        &self,
        metas: &mut BlockMetas,
        index: &BucketIndex,
        synced: &TxGaugeVec,
    ) -> Result<(), FilterError> {
        match self {
            Filter::Basic(f) => f.filter(metas, synced).await,
            Filter::IndexAware(f) => f.filter_with_index(metas, index, synced).await,
        }
    }
}

fn threshold_ms(now: DateTime<Utc>, age: Duration) -> i64 {
    let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .timestamp_millis()
}

/// Excludes the freshest ingester blocks: those whose min time is newer
/// than `now - limit`. A zero limit disables the filter.
#[derive(Debug, Clone)]
pub struct MinTimeMetaFilter {
    limit: Duration,
}

impl MinTimeMetaFilter {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl MetadataFilter for MinTimeMetaFilter {
    async fn filter(&self, metas: &mut BlockMetas, synced: &TxGaugeVec) -> Result<(), FilterError> {
        if self.limit.is_zero() {
            return Ok(());
        }

        let limit = threshold_ms(Utc::now(), self.limit);
        metas.retain(|_, meta| {
            if meta.min_time < limit || meta.source != INGESTER_SOURCE {
                return true;
            }
            synced.inc(MIN_TIME_EXCLUDED_META);
            false
        });
        Ok(())
    }
}

/// Excludes blocks whose data is entirely older than the retention period.
#[derive(Debug, Clone)]
pub struct RetentionFilter {
    retention: Duration,
}

impl RetentionFilter {
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }
}

#[async_trait]
impl MetadataFilter for RetentionFilter {
    async fn filter(&self, metas: &mut BlockMetas, synced: &TxGaugeVec) -> Result<(), FilterError> {
        if self.retention.is_zero() {
            return Ok(());
        }

        let cutoff = threshold_ms(Utc::now(), self.retention);
        metas.retain(|_, meta| {
            if meta.max_time >= cutoff {
                return true;
            }
            synced.inc(RETENTION_EXPIRED_META);
            false
        });
        Ok(())
    }
}

/// Excludes blocks written through the out-of-order ingestion path.
#[derive(Debug, Clone, Default)]
pub struct OutOfOrderFilter;

#[async_trait]
impl MetadataFilter for OutOfOrderFilter {
    async fn filter(&self, metas: &mut BlockMetas, synced: &TxGaugeVec) -> Result<(), FilterError> {
        metas.retain(|_, meta| {
            if !meta.is_out_of_order() {
                return true;
            }
            synced.inc(OUT_OF_ORDER_EXCLUDED_META);
            false
        });
        Ok(())
    }
}

/// Excludes blocks whose sources are fully contained in another block of
/// the same resolution.
///
/// When two blocks have identical sources, the one with the higher
/// compaction level is kept, then the lower ID.
#[derive(Debug, Default)]
pub struct DeduplicateFilter {
    duplicates: Mutex<Vec<BlockId>>,
}

impl DeduplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks excluded by the last run
    pub fn duplicate_ids(&self) -> Vec<BlockId> {
        self.duplicates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MetadataFilter for DeduplicateFilter {
    async fn filter(&self, metas: &mut BlockMetas, synced: &TxGaugeVec) -> Result<(), FilterError> {
        let mut by_resolution: HashMap<i64, Vec<&Arc<BlockMeta>>> = HashMap::new();
        for meta in metas.values() {
            by_resolution.entry(meta.resolution).or_default().push(meta);
        }

        let mut duplicates = Vec::new();
        for group in by_resolution.values_mut() {
            // Widest blocks first so every block is compared against its covers.
            group.sort_by(|a, b| {
                b.compaction
                    .sources
                    .len()
                    .cmp(&a.compaction.sources.len())
                    .then(b.compaction.level.cmp(&a.compaction.level))
                    .then(a.id.cmp(&b.id))
            });

            let mut kept: Vec<BTreeSet<BlockId>> = Vec::new();
            for meta in group.iter() {
                let sources: BTreeSet<BlockId> = meta.compaction.sources.iter().copied().collect();
                if kept.iter().any(|cover| sources.is_subset(cover)) {
                    duplicates.push(meta.id);
                } else {
                    kept.push(sources);
                }
            }
        }

        for id in &duplicates {
            metas.remove(id);
            synced.inc(DUPLICATE_META);
        }
        duplicates.sort();
        *self.duplicates.lock().unwrap_or_else(|e| e.into_inner()) = duplicates;
        Ok(())
    }
}

/// Excludes blocks that were marked for deletion more than `delay` ago,
/// using the deletion marks stored in the bucket index.
#[derive(Debug)]
pub struct IgnoreDeletionMarkFilter {
    delay: Duration,
    deletion_marks: Mutex<HashMap<BlockId, BlockDeletionMark>>,
}

impl IgnoreDeletionMarkFilter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deletion_marks: Mutex::new(HashMap::new()),
        }
    }

    /// Deletion marks seen on the last run for blocks that reached this filter,
    /// including blocks it then excluded
    pub fn deletion_marks(&self) -> HashMap<BlockId, BlockDeletionMark> {
        self.deletion_marks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl IndexAwareFilter for IgnoreDeletionMarkFilter {
    async fn filter_with_index(
        &self,
        metas: &mut BlockMetas,
        index: &BucketIndex,
        synced: &TxGaugeVec,
    ) -> Result<(), FilterError> {
        let cutoff = threshold_ms(Utc::now(), self.delay) / 1000;
        let mut marks = HashMap::with_capacity(index.block_deletion_marks.len());

        for mark in &index.block_deletion_marks {
            if !metas.contains_key(&mark.block_id) {
                continue;
            }
            // Keep the mark visible to callers even when the block is excluded.
            marks.insert(mark.block_id, mark.clone());

            if mark.deletion_time <= cutoff {
                metas.remove(&mark.block_id);
                synced.inc(MARKED_FOR_DELETION_META);
            }
        }

        *self.deletion_marks.lock().unwrap_or_else(|e| e.into_inner()) = marks;
        Ok(())
    }
}
