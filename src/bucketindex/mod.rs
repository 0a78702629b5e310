//! Per-tenant bucket index
//!
//! The bucket index is a periodically rebuilt summary of every block a
//! tenant owns, stored as gzip-compressed JSON next to the blocks. Readers
//! use it instead of listing the bucket. This crate only reads it;
//! [`write_index`] exists for tooling and tests.

mod index;
mod reader;
mod tenant;

pub use index::{BlockDeletionMark, BucketIndex, IndexBlock, INDEX_VERSION_1, INDEX_VERSION_2};
pub use reader::{read_index, write_index, IndexError, INDEX_COMPRESSED_FILENAME};
pub use tenant::{StaticTenantConfig, TenantConfigProvider};
