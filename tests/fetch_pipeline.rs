use chrono::Utc;
use prometheus::Registry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use blockyard::block::{BlockId, BlockMeta, INGESTER_SOURCE, meta_path};
use blockyard::bucketindex::{BlockDeletionMark, BucketIndex, IndexBlock, StaticTenantConfig, write_index};
use blockyard::compactor::{Job, group_jobs, wait_period_elapsed};
use blockyard::config::{FetcherConfig, HumanDuration, StorageConfig, StorageProvider};
use blockyard::fetcher::{FetchOutcome, MetadataFetcher, default_filters};
use blockyard::storage::{StorageClient, build_store};

const TENANT: &str = "user-1";
const DAY_MS: i64 = 86_400_000;

fn filesystem_bucket(root: &Path) -> StorageClient {
    let config = StorageConfig {
        provider: StorageProvider::Filesystem,
        root: root.to_path_buf(),
        ..StorageConfig::default()
    };
    build_store(&config).expect("Failed to build filesystem bucket")
}

fn id(ts: u64) -> BlockId {
    BlockId::from_parts(ts, 0)
}

/// Uploads meta files for `metas` and an index listing them
async fn seed(bucket: &StorageClient, metas: &[BlockMeta], marks: Vec<BlockDeletionMark>) {
    for meta in metas {
        bucket
            .upload(
                &format!("{}/{}", TENANT, meta_path(&meta.id)),
                serde_json::to_vec(meta).unwrap(),
            )
            .await
            .unwrap();
    }
    let mut index = BucketIndex::new(metas.iter().map(|m| IndexBlock::from_meta(m, 0)).collect(), Utc::now());
    index.block_deletion_marks = marks;
    write_index(bucket, TENANT, &StaticTenantConfig::default(), &index)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_default_filter_chain_end_to_end() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bucket = filesystem_bucket(dir.path());
    let now = Utc::now().timestamp_millis();

    let mut compacted = BlockMeta::new(id(10)).with_level(2).with_time_range(now - 3 * DAY_MS, now - 2 * DAY_MS);
    compacted.compaction.sources = vec![id(1), id(2)];

    let metas = vec![
        // Sources of `compacted`, dropped as duplicates.
        BlockMeta::new(id(1)).with_time_range(now - 3 * DAY_MS, now - 2 * DAY_MS),
        BlockMeta::new(id(2)).with_time_range(now - 3 * DAY_MS, now - 2 * DAY_MS),
        compacted,
        // Outside retention.
        BlockMeta::new(id(3)).with_time_range(now - 40 * DAY_MS, now - 39 * DAY_MS),
        // Written through the out-of-order path.
        BlockMeta::new(id(4)).with_time_range(now - DAY_MS, now).out_of_order(),
        // Marked for deletion long ago.
        BlockMeta::new(id(5)).with_time_range(now - DAY_MS, now),
        // Too fresh from an ingester.
        BlockMeta::new(id(6)).with_time_range(now - 60_000, now).with_source(INGESTER_SOURCE),
        // Survivor.
        BlockMeta::new(id(7)).with_time_range(now - DAY_MS, now - DAY_MS / 2),
    ];
    let marks = vec![BlockDeletionMark {
        block_id: id(5),
        deletion_time: Utc::now().timestamp() - 2 * 86_400,
    }];
    seed(&bucket, &metas, marks).await;

    let config = FetcherConfig {
        min_time_limit: HumanDuration::from_secs(3_600),
        retention: HumanDuration::from_secs(30 * 86_400),
        deletion_delay: HumanDuration::from_secs(86_400),
        exclude_out_of_order: true,
        deduplicate: true,
    };
    let registry = Registry::new();
    let mut fetcher = MetadataFetcher::builder()
        .tenant(TENANT)
        .bucket(Arc::new(bucket.clone()))
        .provider(Arc::new(StaticTenantConfig::default()))
        .filters(default_filters(&config))
        .registry(&registry)
        .build()
        .unwrap();

    let output = fetcher.fetch(&CancellationToken::new()).await.unwrap();

    assert_eq!(output.outcome, FetchOutcome::Loaded);
    let mut ids: Vec<_> = output.metas.keys().copied().collect();
    ids.sort();
    assert_eq!(ids, vec![id(7), id(10)]);

    let synced = &fetcher.metrics().synced;
    assert_eq!(synced.published("loaded"), 2.0);
    assert_eq!(synced.published("duplicate"), 2.0);
    assert_eq!(synced.published("retention-expired"), 1.0);
    assert_eq!(synced.published("out-of-order-excluded"), 1.0);
    assert_eq!(synced.published("marked-for-deletion"), 1.0);
    assert_eq!(synced.published("min-time-excluded"), 1.0);
}

#[tokio::test]
async fn test_wait_period_against_filesystem_bucket() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bucket = filesystem_bucket(dir.path());
    let metas = vec![BlockMeta::new(id(1)), BlockMeta::new(id(2))];
    seed(&bucket, &metas, Vec::new()).await;

    let registry = Registry::new();
    let mut fetcher = MetadataFetcher::builder()
        .tenant(TENANT)
        .bucket(Arc::new(bucket.clone()))
        .provider(Arc::new(StaticTenantConfig::default()))
        .registry(&registry)
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let output = fetcher.fetch(&cancel).await.unwrap();

    let jobs: Vec<Job> = group_jobs(TENANT, &output.metas);
    assert_eq!(jobs.len(), 1);
    let tenant_bucket = bucket.scoped(TENANT);

    // Meta files were just written.
    let status = wait_period_elapsed(&jobs[0], Duration::from_secs(900), &tenant_bucket, 8, &cancel)
        .await
        .unwrap();
    assert!(!status.is_elapsed());
    assert_eq!(status.blocking_meta().map(|m| m.id), Some(id(1)));

    let status = wait_period_elapsed(&jobs[0], Duration::ZERO, &tenant_bucket, 8, &cancel)
        .await
        .unwrap();
    assert!(status.is_elapsed());
}

#[tokio::test]
async fn test_tenant_without_index() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bucket = filesystem_bucket(dir.path());
    let registry = Registry::new();
    let mut fetcher = MetadataFetcher::builder()
        .tenant("new-tenant")
        .bucket(Arc::new(bucket))
        .provider(Arc::new(StaticTenantConfig::default()))
        .filters(default_filters(&FetcherConfig::default()))
        .registry(&registry)
        .build()
        .unwrap();

    let output = fetcher.fetch(&CancellationToken::new()).await.unwrap();

    assert_eq!(output.outcome, FetchOutcome::NoBucketIndex);
    assert!(output.metas.is_empty());
    assert_eq!(fetcher.metrics().synced.published("no-bucket-index"), 1.0);
}
