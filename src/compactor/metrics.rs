use prometheus::{IntCounter, IntGauge, Registry};

/// Process-wide compactor metrics
#[derive(Clone)]
pub struct CompactorMetrics {
    pub jobs_planned: IntCounter,
    pub jobs_waiting: IntCounter,
    pub tenants_synced: IntCounter,
    pub tenant_sync_failures: IntCounter,
    pub tenants: IntGauge,
}

impl CompactorMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let jobs_planned = IntCounter::new(
            "compactor_jobs_planned_total",
            "Compaction jobs built from fetched block metas",
        )?;
        let jobs_waiting = IntCounter::new(
            "compactor_jobs_waiting_total",
            "Compaction jobs held back because their wait period has not elapsed",
        )?;
        let tenants_synced = IntCounter::new(
            "compactor_tenants_synced_total",
            "Tenants whose block metas were synced successfully",
        )?;
        let tenant_sync_failures = IntCounter::new(
            "compactor_tenant_sync_failures_total",
            "Tenant syncs that failed",
        )?;
        let tenants = IntGauge::new("compactor_tenants", "Tenants known to the compactor")?;

        registry.register(Box::new(jobs_planned.clone()))?;
        registry.register(Box::new(jobs_waiting.clone()))?;
        registry.register(Box::new(tenants_synced.clone()))?;
        registry.register(Box::new(tenant_sync_failures.clone()))?;
        registry.register(Box::new(tenants.clone()))?;

        Ok(Self {
            jobs_planned,
            jobs_waiting,
            tenants_synced,
            tenant_sync_failures,
            tenants,
        })
    }
}
