use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::BlockId;

/// Compaction hint marking blocks written through the out-of-order path
pub const OUT_OF_ORDER_HINT: &str = "from-out-of-order";

/// External labels attached to a block, kept sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable FNV-1a hash over the sorted label pairs.
    ///
    /// Used to build group keys, so it must not change across releases.
    pub fn stable_hash(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;
        const SEP: u8 = 0xff;

        let mut hash = OFFSET;
        let mut feed = |bytes: &[u8]| {
            for b in bytes {
                hash ^= u64::from(*b);
                hash = hash.wrapping_mul(PRIME);
            }
        };
        for (name, value) in self.iter() {
            feed(name.as_bytes());
            feed(&[SEP]);
            feed(value.as_bytes());
            feed(&[SEP]);
        }
        hash
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}=\"{}\"", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Series/sample counters recorded when the block was written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    #[serde(default)]
    pub num_samples: u64,
    #[serde(default)]
    pub num_series: u64,
    #[serde(default)]
    pub num_chunks: u64,
}

/// Compaction history of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compaction {
    /// Number of compaction passes the block went through. 1 = raw upload.
    pub level: u32,
    /// IDs of the level-1 blocks whose data ended up in this block.
    #[serde(default)]
    pub sources: Vec<BlockId>,
    #[serde(default)]
    pub parents: Vec<BlockId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl Default for Compaction {
    fn default() -> Self {
        Self {
            level: 1,
            sources: Vec::new(),
            parents: Vec::new(),
            hints: Vec::new(),
        }
    }
}

impl Compaction {
    pub fn is_out_of_order(&self) -> bool {
        self.hints.iter().any(|h| h == OUT_OF_ORDER_HINT)
    }

    pub fn set_out_of_order(&mut self) {
        if !self.is_out_of_order() {
            self.hints.push(OUT_OF_ORDER_HINT.to_string());
        }
    }
}

/// Metadata of one immutable block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    #[serde(rename = "ulid")]
    pub id: BlockId,
    /// Inclusive lower bound, milliseconds since epoch.
    pub min_time: i64,
    /// Exclusive upper bound, milliseconds since epoch.
    pub max_time: i64,
    #[serde(default)]
    pub stats: BlockStats,
    #[serde(default)]
    pub compaction: Compaction,
    #[serde(default = "default_meta_version")]
    pub version: u32,
    #[serde(default)]
    pub labels: Labels,
    /// Downsampling resolution in milliseconds, 0 for raw data.
    #[serde(default)]
    pub resolution: i64,
    #[serde(default)]
    pub source: String,
}

fn default_meta_version() -> u32 {
    1
}

impl BlockMeta {
    /// Bare level-1 meta for the given block, spanning no time.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            min_time: 0,
            max_time: 0,
            stats: BlockStats::default(),
            compaction: Compaction {
                sources: vec![id],
                ..Compaction::default()
            },
            version: default_meta_version(),
            labels: Labels::new(),
            resolution: 0,
            source: String::new(),
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.compaction.level = level;
        self
    }

    pub fn with_time_range(mut self, min_time: i64, max_time: i64) -> Self {
        self.min_time = min_time;
        self.max_time = max_time;
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_resolution(mut self, resolution: i64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn out_of_order(mut self) -> Self {
        self.compaction.set_out_of_order();
        self
    }

    pub fn is_out_of_order(&self) -> bool {
        self.compaction.is_out_of_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_hint() {
        let meta = BlockMeta::new(BlockId::from_parts(1, 0));
        assert!(!meta.is_out_of_order());

        let meta = meta.out_of_order().out_of_order();
        assert!(meta.is_out_of_order());
        assert_eq!(meta.compaction.hints, vec![OUT_OF_ORDER_HINT.to_string()]);
    }

    #[test]
    fn test_labels_hash_is_order_independent() {
        let a: Labels = [("zone", "eu"), ("cluster", "a")].into_iter().collect();
        let b: Labels = [("cluster", "a"), ("zone", "eu")].into_iter().collect();
        let c: Labels = [("cluster", "b"), ("zone", "eu")].into_iter().collect();

        assert_eq!(a.stable_hash(), b.stable_hash());
        assert_ne!(a.stable_hash(), c.stable_hash());
        assert_eq!(a.to_string(), "{cluster=\"a\", zone=\"eu\"}");
    }

    #[test]
    fn test_meta_json_defaults() {
        let id = BlockId::from_parts(42, 7);
        let json = format!(r#"{{"ulid": "{}", "min_time": 10, "max_time": 20}}"#, id);

        let meta: BlockMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta.id, id);
        assert_eq!(meta.compaction.level, 1);
        assert_eq!(meta.version, 1);
        assert!(meta.labels.is_empty());
        assert_eq!(meta.resolution, 0);
    }
}
