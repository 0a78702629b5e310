use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::job::Job;
use crate::block::{meta_path, BlockMeta};
use crate::storage::{BucketReader, StorageError};

/// Attribute lookups issued in parallel by default
pub const DEFAULT_ATTRIBUTES_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum WaitPeriodError {
    #[error("get attributes of {path} for block {block}: {source}", block = .meta.id)]
    Attributes {
        meta: Arc<BlockMeta>,
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("wait period check cancelled")]
    Cancelled,
}

impl WaitPeriodError {
    /// Block whose lookup failed
    pub fn meta(&self) -> Option<&Arc<BlockMeta>> {
        match self {
            WaitPeriodError::Attributes { meta, .. } => Some(meta),
            WaitPeriodError::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitPeriodStatus {
    Elapsed,
    /// `blocking` is the first block, in append order, uploaded too recently
    NotElapsed { blocking: Arc<BlockMeta> },
}

impl WaitPeriodStatus {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, WaitPeriodStatus::Elapsed)
    }

    pub fn blocking_meta(&self) -> Option<&Arc<BlockMeta>> {
        match self {
            WaitPeriodStatus::Elapsed => None,
            WaitPeriodStatus::NotElapsed { blocking } => Some(blocking),
        }
    }
}

/// Check that every raw block of the job was uploaded at least `wait` ago.
///
/// Only level-1 blocks not written through the out-of-order path are
/// checked. Their `meta.json` last-modified time is read from `bucket`,
/// which must be scoped to the job's tenant. Lookups run up to
/// `concurrency` at a time, but results are resolved in append order: the
/// first failing or blocking block wins. A zero `wait` skips the check
/// without touching the bucket.
pub async fn wait_period_elapsed(
    job: &Job,
    wait: Duration,
    bucket: &dyn BucketReader,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<WaitPeriodStatus, WaitPeriodError> {
    if wait.is_zero() {
        return Ok(WaitPeriodStatus::Elapsed);
    }

    let threshold = upload_threshold(Utc::now(), wait);

    let lookups: Vec<_> = job
        .metas()
        .iter()
        .filter(|meta| meta.compaction.level == 1 && !meta.is_out_of_order())
        .map(|meta| {
            async move {
                let path = meta_path(&meta.id);
                let attrs = bucket.attributes(&path).await;
                (meta, path, attrs)
            }
            .boxed()
        })
        .collect();

    let mut lookups = stream::iter(lookups).buffered(concurrency.max(1));

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitPeriodError::Cancelled),
            next = lookups.next() => next,
        };
        let Some((meta, path, attrs)) = next else {
            break;
        };

        let attrs = attrs.map_err(|source| WaitPeriodError::Attributes {
            meta: Arc::clone(meta),
            path,
            source,
        })?;

        if attrs.last_modified > threshold {
            tracing::debug!(
                block = %meta.id,
                last_modified = %attrs.last_modified,
                "Block uploaded within the wait period"
            );
            return Ok(WaitPeriodStatus::NotElapsed {
                blocking: Arc::clone(meta),
            });
        }
    }

    Ok(WaitPeriodStatus::Elapsed)
}

fn upload_threshold(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|wait| now.checked_sub_signed(wait))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
