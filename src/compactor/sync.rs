use futures::FutureExt;
use futures::stream::{self, StreamExt};
use prometheus::Registry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::grouper::group_jobs;
use super::job::Job;
use super::metrics::CompactorMetrics;
use super::wait::{wait_period_elapsed, WaitPeriodStatus};
use crate::block::BlockId;
use crate::bucketindex::TenantConfigProvider;
use crate::config::{CompactorConfig, FetcherConfig};
use crate::fetcher::{default_filters, FetchOutcome, MetadataFetcher};
use crate::storage::{StorageClient, StorageError};
use crate::tenant_metrics::TenantRegistries;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("discover tenants: {0}")]
    ListTenants(#[source] StorageError),

    #[error("sync cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Ready,
    Waiting { blocking: BlockId },
    Failed { error: String },
}

#[derive(Debug)]
pub struct PlannedJob {
    pub job: Job,
    pub status: JobStatus,
}

#[derive(Debug)]
pub enum TenantOutcome {
    Synced {
        fetch: FetchOutcome,
        blocks: usize,
        jobs: Vec<PlannedJob>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug)]
pub struct TenantReport {
    pub tenant: String,
    pub outcome: TenantOutcome,
}

impl TenantReport {
    pub fn jobs(&self) -> &[PlannedJob] {
        match &self.outcome {
            TenantOutcome::Synced { jobs, .. } => jobs,
            TenantOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TenantOutcome::Failed { .. })
    }
}

/// Outcome of one sync cycle, sorted by tenant
#[derive(Debug, Default)]
pub struct SyncReport {
    pub tenants: Vec<TenantReport>,
}

impl SyncReport {
    pub fn tenant(&self, tenant: &str) -> Option<&TenantReport> {
        self.tenants.iter().find(|r| r.tenant == tenant)
    }

    pub fn ready_jobs(&self) -> impl Iterator<Item = &Job> {
        self.tenants
            .iter()
            .flat_map(|r| r.jobs())
            .filter(|p| p.status == JobStatus::Ready)
            .map(|p| &p.job)
    }

    pub fn failed_tenants(&self) -> Vec<&str> {
        self.tenants
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.tenant.as_str())
            .collect()
    }
}

/// Keeps one metadata fetcher per tenant and turns their output into jobs.
pub struct TenantSyncer {
    bucket: StorageClient,
    provider: Arc<dyn TenantConfigProvider>,
    compactor: CompactorConfig,
    fetcher: FetcherConfig,
    registries: Arc<TenantRegistries>,
    fetchers: BTreeMap<String, MetadataFetcher>,
    metrics: CompactorMetrics,
}

#[bon::bon]
impl TenantSyncer {
    /// `registry` receives the compactor-wide metrics; fetcher metrics go
    /// into per-tenant registries tracked by `registries`.
    #[builder]
    pub fn new(
        bucket: StorageClient,
        provider: Arc<dyn TenantConfigProvider>,
        #[builder(default)] compactor: CompactorConfig,
        #[builder(default)] fetcher: FetcherConfig,
        registries: Arc<TenantRegistries>,
        registry: &Registry,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            bucket,
            provider,
            compactor,
            fetcher,
            registries,
            fetchers: BTreeMap::new(),
            metrics: CompactorMetrics::new(registry)?,
        })
    }
}

impl TenantSyncer {
    pub fn tenants(&self) -> Vec<&str> {
        self.fetchers.keys().map(String::as_str).collect()
    }

    /// Fetch every tenant's metas and plan its jobs.
    ///
    /// A failing tenant is reported in the returned [`SyncReport`] and does
    /// not stop the others.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let tenants = self.discover_tenants(cancel).await?;
        let mut reports = self.reconcile(&tenants);

        let bucket = &self.bucket;
        let provider = &self.provider;
        let compactor = &self.compactor;
        let concurrency = compactor.tenant_concurrency.max(1);

        let tenant_syncs: Vec<_> = self
            .fetchers
            .iter_mut()
            .map(|(tenant, fetcher)| {
                async move {
                    let scoped = bucket.scoped(&provider.tenant_prefix(tenant));
                    let outcome = sync_tenant(fetcher, &scoped, compactor, cancel).await;
                    TenantReport {
                        tenant: tenant.clone(),
                        outcome,
                    }
                }
                .boxed()
            })
            .collect();

        let synced: Vec<TenantReport> = stream::iter(tenant_syncs)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        reports.extend(synced);
        reports.sort_by(|a, b| a.tenant.cmp(&b.tenant));

        for report in &reports {
            match &report.outcome {
                TenantOutcome::Synced { jobs, .. } => {
                    self.metrics.tenants_synced.inc();
                    self.metrics.jobs_planned.inc_by(jobs.len() as u64);
                    let waiting = jobs
                        .iter()
                        .filter(|p| matches!(p.status, JobStatus::Waiting { .. }))
                        .count();
                    self.metrics.jobs_waiting.inc_by(waiting as u64);
                }
                TenantOutcome::Failed { error } => {
                    self.metrics.tenant_sync_failures.inc();
                    warn!(tenant = %report.tenant, error = %error, "Tenant sync failed");
                }
            }
        }

        let report = SyncReport { tenants: reports };
        info!(
            tenants = report.tenants.len(),
            failed = report.failed_tenants().len(),
            ready_jobs = report.ready_jobs().count(),
            "Sync cycle complete"
        );
        Ok(report)
    }

    async fn discover_tenants(&self, cancel: &CancellationToken) -> Result<Vec<String>, SyncError> {
        if !self.compactor.tenants.is_empty() {
            return Ok(self.compactor.tenants.clone());
        }

        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            listed = self.bucket.list_tenants() => listed.map_err(SyncError::ListTenants)?,
        };

        Ok(merge_overrides(listed, &self.provider.prefix_overrides()))
    }

    /// Align fetchers and tenant registries with `tenants`. Tenants whose
    /// fetcher cannot be created are returned as failed reports.
    fn reconcile(&mut self, tenants: &[String]) -> Vec<TenantReport> {
        let wanted: BTreeSet<&str> = tenants.iter().map(String::as_str).collect();

        let registries = &self.registries;
        self.fetchers.retain(|tenant, _| {
            let keep = wanted.contains(tenant.as_str());
            if !keep {
                registries.remove_tenant(tenant);
                info!(tenant, "Tenant removed");
            }
            keep
        });

        let mut failed = Vec::new();
        for tenant in wanted {
            if self.fetchers.contains_key(tenant) {
                continue;
            }

            let registry = Registry::new();
            let created = MetadataFetcher::builder()
                .tenant(tenant)
                .bucket(Arc::new(self.bucket.clone()))
                .provider(Arc::clone(&self.provider))
                .filters(default_filters(&self.fetcher))
                .registry(&registry)
                .build();

            match created {
                Ok(fetcher) => {
                    self.registries.add_tenant(tenant, registry);
                    self.fetchers.insert(tenant.to_string(), fetcher);
                    info!(tenant, "Tenant added");
                }
                Err(e) => failed.push(TenantReport {
                    tenant: tenant.to_string(),
                    outcome: TenantOutcome::Failed {
                        error: format!("register fetcher metrics: {}", e),
                    },
                }),
            }
        }

        self.metrics.tenants.set(self.fetchers.len() as i64);
        failed
    }
}

/// Combine listed top-level prefixes with overridden tenants.
///
/// A listed prefix that is the root of some tenant's override holds that
/// tenant's blocks, so it is not a tenant itself unless it is overridden too.
fn merge_overrides(listed: Vec<String>, overrides: &[(String, String)]) -> Vec<String> {
    let overridden: BTreeSet<&str> = overrides.iter().map(|(tenant, _)| tenant.as_str()).collect();
    let roots: BTreeSet<&str> = overrides
        .iter()
        .filter_map(|(_, prefix)| prefix.trim_matches('/').split('/').next())
        .collect();

    let mut tenants: BTreeSet<String> = listed
        .into_iter()
        .filter(|name| overridden.contains(name.as_str()) || !roots.contains(name.as_str()))
        .collect();
    tenants.extend(overridden.iter().map(|tenant| tenant.to_string()));
    tenants.into_iter().collect()
}

async fn sync_tenant(
    fetcher: &mut MetadataFetcher,
    bucket: &StorageClient,
    config: &CompactorConfig,
    cancel: &CancellationToken,
) -> TenantOutcome {
    let output = match fetcher.fetch(cancel).await {
        Ok(output) => output,
        Err(e) => {
            return TenantOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    let blocks = output.metas.len();
    let mut jobs = Vec::new();
    for job in group_jobs(fetcher.tenant(), &output.metas) {
        let status = match wait_period_elapsed(
            &job,
            config.wait_period.as_duration(),
            bucket,
            config.attributes_concurrency,
            cancel,
        )
        .await
        {
            Ok(WaitPeriodStatus::Elapsed) => JobStatus::Ready,
            Ok(WaitPeriodStatus::NotElapsed { blocking }) => JobStatus::Waiting {
                blocking: blocking.id,
            },
            Err(e) => {
                warn!(tenant = fetcher.tenant(), job = %job, error = %e, "Wait period check failed");
                JobStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        jobs.push(PlannedJob { job, status });
    }

    TenantOutcome::Synced {
        fetch: output.outcome,
        blocks,
        jobs,
    }
}
