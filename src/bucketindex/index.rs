use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::block::{BlockId, BlockMeta, BlockStats, Compaction, Labels};

pub const INDEX_VERSION_1: u32 = 1;
/// Adds compaction level, out-of-order flag and external labels to blocks.
pub const INDEX_VERSION_2: u32 = 2;

/// Snapshot of a tenant's blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketIndex {
    pub version: u32,
    #[serde(default)]
    pub blocks: Vec<IndexBlock>,
    #[serde(default)]
    pub block_deletion_marks: Vec<BlockDeletionMark>,
    /// When the index was last rebuilt
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

/// One block as recorded in the bucket index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBlock {
    pub block_id: BlockId,
    pub min_time: i64,
    pub max_time: i64,
    /// Unix seconds of the block upload
    #[serde(default)]
    pub uploaded_at: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Absent in version 1 indexes, read as 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_level: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_order: bool,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default)]
    pub resolution: i64,
    /// Level-1 blocks merged into this one; absent means the block is its own source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<BlockId>,
}

/// Deletion mark of a block that is pending removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeletionMark {
    pub block_id: BlockId,
    /// Unix seconds of when the block was marked
    pub deletion_time: i64,
}

impl IndexBlock {
    /// Index entry describing the given meta
    pub fn from_meta(meta: &BlockMeta, uploaded_at: i64) -> Self {
        Self {
            block_id: meta.id,
            min_time: meta.min_time,
            max_time: meta.max_time,
            uploaded_at,
            source: meta.source.clone(),
            compaction_level: Some(meta.compaction.level),
            out_of_order: meta.is_out_of_order(),
            labels: meta.labels.clone(),
            resolution: meta.resolution,
            sources: meta.compaction.sources.clone(),
        }
    }

    pub fn level(&self) -> u32 {
        self.compaction_level.unwrap_or(1)
    }

    /// Reconstruct the block meta from the index entry
    pub fn to_meta(&self) -> BlockMeta {
        let sources = if self.sources.is_empty() {
            vec![self.block_id]
        } else {
            self.sources.clone()
        };

        let mut compaction = Compaction {
            level: self.level(),
            sources,
            ..Compaction::default()
        };
        if self.out_of_order {
            compaction.set_out_of_order();
        }

        BlockMeta {
            id: self.block_id,
            min_time: self.min_time,
            max_time: self.max_time,
            stats: BlockStats::default(),
            compaction,
            version: 1,
            labels: self.labels.clone(),
            resolution: self.resolution,
            source: self.source.clone(),
        }
    }
}

impl BucketIndex {
    pub fn new(blocks: Vec<IndexBlock>, updated_at: DateTime<Utc>) -> Self {
        Self {
            version: INDEX_VERSION_2,
            blocks,
            block_deletion_marks: Vec::new(),
            updated_at,
        }
    }

    /// Structural checks; a failing index is treated as corrupted
    pub fn validate(&self) -> Result<(), String> {
        if self.version != INDEX_VERSION_1 && self.version != INDEX_VERSION_2 {
            return Err(format!("unsupported bucket index version {}", self.version));
        }

        let mut seen = HashSet::with_capacity(self.blocks.len());
        for block in &self.blocks {
            if !seen.insert(block.block_id) {
                return Err(format!("duplicate block {} in index", block.block_id));
            }
            if block.min_time > block.max_time {
                return Err(format!(
                    "block {} has min time {} after max time {}",
                    block.block_id, block.min_time, block.max_time
                ));
            }
            if block.level() == 0 {
                return Err(format!("block {} has compaction level 0", block.block_id));
            }
        }

        Ok(())
    }
}
