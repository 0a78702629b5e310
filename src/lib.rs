pub mod block;
pub mod bucketindex;
pub mod compactor;
pub mod config;
pub mod fetcher;
pub mod humanize;
pub mod observability;
pub mod server;
pub mod storage;
pub mod tenant_metrics;
