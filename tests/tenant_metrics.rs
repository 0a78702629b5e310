use chrono::Utc;
use prometheus::Registry;
use prometheus::proto::MetricFamily;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use blockyard::block::{BlockId, BlockMeta};
use blockyard::bucketindex::{BucketIndex, IndexBlock, StaticTenantConfig, write_index};
use blockyard::fetcher::MetadataFetcher;
use blockyard::storage::StorageClient;
use blockyard::tenant_metrics::TenantRegistries;

fn value(families: &[MetricFamily], name: &str, state: Option<&str>) -> f64 {
    let family = families
        .iter()
        .find(|f| f.get_name() == name)
        .unwrap_or_else(|| panic!("missing family {}", name));
    let metric = family
        .get_metric()
        .iter()
        .find(|m| match state {
            Some(state) => m.get_label().iter().any(|l| l.get_value() == state),
            None => true,
        })
        .unwrap_or_else(|| panic!("missing series {} {:?}", name, state));

    if metric.has_counter() {
        metric.get_counter().get_value()
    } else if metric.has_gauge() {
        metric.get_gauge().get_value()
    } else {
        metric.get_histogram().get_sample_count() as f64
    }
}

/// Tenant `user-N` owns N blocks.
#[tokio::test]
async fn test_aggregate_equals_sum_of_active_tenants() {
    let bucket = StorageClient::in_memory();
    let provider = Arc::new(StaticTenantConfig::default());
    let registries = TenantRegistries::new();
    let cancel = CancellationToken::new();

    let tenants = ["user-1", "user-2", "user-3"];
    let mut fetchers = Vec::new();
    for (i, tenant) in tenants.iter().enumerate() {
        let blocks = (0..=i as u64)
            .map(|ts| IndexBlock::from_meta(&BlockMeta::new(BlockId::from_parts(ts + 1, 0)), 0))
            .collect();
        write_index(&bucket, tenant, provider.as_ref(), &BucketIndex::new(blocks, Utc::now()))
            .await
            .unwrap();

        let registry = Registry::new();
        let mut fetcher = MetadataFetcher::builder()
            .tenant(*tenant)
            .bucket(Arc::new(bucket.clone()))
            .provider(provider.clone())
            .registry(&registry)
            .build()
            .unwrap();
        fetcher.fetch(&cancel).await.unwrap();
        // user-3 fetches twice
        if i == 2 {
            fetcher.fetch(&cancel).await.unwrap();
        }

        registries.add_tenant(*tenant, registry);
        fetchers.push(fetcher);
    }

    let families = registries.gather();
    assert_eq!(value(&families, "blocks_meta_syncs_total", None), 4.0);
    assert_eq!(value(&families, "blocks_meta_synced", Some("loaded")), 6.0);
    assert_eq!(value(&families, "blocks_meta_sync_duration_seconds", None), 4.0);

    registries.remove_tenant("user-2");

    let families = registries.gather();
    assert_eq!(value(&families, "blocks_meta_syncs_total", None), 3.0);
    assert_eq!(value(&families, "blocks_meta_synced", Some("loaded")), 4.0);
    assert_eq!(value(&families, "blocks_meta_synced", Some("failed")), 0.0);
    assert_eq!(value(&families, "blocks_meta_sync_duration_seconds", None), 3.0);
    assert_eq!(value(&families, "blocks_meta_sync_failures_total", None), 0.0);
}
