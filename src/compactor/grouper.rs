use std::collections::BTreeMap;
use std::sync::Arc;

use super::job::Job;
use crate::block::BlockMeta;
use crate::fetcher::BlockMetas;

/// Key shared by blocks that may be compacted together
pub fn group_key(meta: &BlockMeta) -> String {
    format!("{}@{}", meta.resolution, meta.labels.stable_hash())
}

/// Split a tenant's metas into one job per group.
///
/// Blocks are appended oldest first (by min time, then ID) and jobs are
/// returned sorted by key, so the output is stable across fetches.
pub fn group_jobs(tenant: &str, metas: &BlockMetas) -> Vec<Job> {
    let mut sorted: Vec<&Arc<BlockMeta>> = metas.values().collect();
    sorted.sort_by_key(|m| (m.min_time, m.id));

    let mut jobs: BTreeMap<String, Job> = BTreeMap::new();
    for meta in sorted {
        let key = group_key(meta);
        let job = jobs
            .entry(key.clone())
            .or_insert_with(|| Job::new(tenant, key, meta.labels.clone(), meta.resolution, false, 0, ""));

        // Same key means same labels and resolution, barring a hash collision.
        if let Err(e) = job.append_meta(Arc::clone(meta)) {
            tracing::warn!(tenant, error = %e, "Skipping block in group");
        }
    }

    jobs.into_values().collect()
}
