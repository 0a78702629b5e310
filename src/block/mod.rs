//! Block identity and metadata
//!
//! A block is an immutable, time-bounded unit of series data. Every block
//! carries a `meta.json` describing its time range, compaction history and
//! external labels. This module only models that metadata; the block
//! contents are never read here.

mod meta;

pub use meta::{BlockMeta, BlockStats, Compaction, Labels, OUT_OF_ORDER_HINT};

/// Globally unique, time-sortable block identifier.
pub type BlockId = ulid::Ulid;

/// Name of the metadata file stored at the root of every block.
pub const META_FILENAME: &str = "meta.json";

/// Source value stamped on blocks uploaded by ingesters.
pub const INGESTER_SOURCE: &str = "ingester";

/// Path of a block's meta file, relative to the tenant prefix.
pub fn meta_path(id: &BlockId) -> String {
    format!("{}/{}", id, META_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_path() {
        let id = BlockId::from_parts(1, 0);
        assert_eq!(meta_path(&id), format!("{}/meta.json", id));
    }
}
