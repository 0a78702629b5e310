use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::block::{BlockId, BlockMeta, Labels};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("block {block} has labels {got}, job {key} expects {expected}")]
    LabelsMismatch {
        key: String,
        block: BlockId,
        expected: Labels,
        got: Labels,
    },

    #[error("block {block} has resolution {got}, job {key} expects {expected}")]
    ResolutionMismatch {
        key: String,
        block: BlockId,
        expected: i64,
        got: i64,
    },
}

/// A set of blocks compacted together in one pass.
///
/// Every appended block shares the job's external labels and resolution.
#[derive(Debug, Clone)]
pub struct Job {
    tenant: String,
    key: String,
    labels: Labels,
    resolution: i64,
    metas: Vec<Arc<BlockMeta>>,
    min_compaction_level: Option<u32>,

    use_splitting: bool,
    split_number_of_shards: u32,
    /// Shard this job compacts, empty when the job is not sharded
    sharding_key: String,
}

impl Job {
    pub fn new(
        tenant: impl Into<String>,
        key: impl Into<String>,
        labels: Labels,
        resolution: i64,
        use_splitting: bool,
        split_number_of_shards: u32,
        sharding_key: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            key: key.into(),
            labels,
            resolution,
            metas: Vec::new(),
            min_compaction_level: None,
            use_splitting,
            split_number_of_shards,
            sharding_key: sharding_key.into(),
        }
    }

    /// Add a block to the job. A rejected block leaves the job unchanged.
    pub fn append_meta(&mut self, meta: Arc<BlockMeta>) -> Result<(), JobError> {
        if meta.labels != self.labels {
            return Err(JobError::LabelsMismatch {
                key: self.key.clone(),
                block: meta.id,
                expected: self.labels.clone(),
                got: meta.labels.clone(),
            });
        }
        if meta.resolution != self.resolution {
            return Err(JobError::ResolutionMismatch {
                key: self.key.clone(),
                block: meta.id,
                expected: self.resolution,
                got: meta.resolution,
            });
        }

        let level = meta.compaction.level;
        self.min_compaction_level = Some(match self.min_compaction_level {
            Some(min) => min.min(level),
            None => level,
        });
        self.metas.push(meta);
        Ok(())
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn use_splitting(&self) -> bool {
        self.use_splitting
    }

    pub fn split_number_of_shards(&self) -> u32 {
        self.split_number_of_shards
    }

    pub fn sharding_key(&self) -> &str {
        &self.sharding_key
    }

    /// Blocks in append order
    pub fn metas(&self) -> &[Arc<BlockMeta>] {
        &self.metas
    }

    pub fn ids(&self) -> Vec<BlockId> {
        self.metas.iter().map(|m| m.id).collect()
    }

    pub fn min_time(&self) -> Option<i64> {
        self.metas.iter().map(|m| m.min_time).min()
    }

    pub fn max_time(&self) -> Option<i64> {
        self.metas.iter().map(|m| m.max_time).max()
    }

    /// Lowest compaction level among the appended blocks, 0 for an empty job
    pub fn min_compaction_level(&self) -> u32 {
        self.min_compaction_level.unwrap_or(0)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (tenant {}, {} blocks", self.key, self.tenant, self.metas.len())?;
        if let (Some(min), Some(max)) = (self.min_time(), self.max_time()) {
            write!(f, ", range {}-{}", min, max)?;
        }
        if !self.sharding_key.is_empty() {
            write!(f, ", shard {}", self.sharding_key)?;
        }
        write!(f, ")")
    }
}
