//! Compaction planning
//!
//! A [`Job`] groups blocks that share external labels and resolution.
//! Before a job with raw (level-1) blocks is compacted,
//! [`wait_period_elapsed`] checks that those blocks were uploaded long
//! enough ago for the object store to have settled. [`TenantSyncer`] drives
//! the per-tenant fetchers and turns their output into jobs; executing the
//! merge itself is left to the caller.

mod grouper;
mod job;
mod metrics;
mod sync;
mod wait;

pub use grouper::{group_jobs, group_key};
pub use job::{Job, JobError};
pub use metrics::CompactorMetrics;
pub use sync::{
    JobStatus, PlannedJob, SyncError, SyncReport, TenantOutcome, TenantReport, TenantSyncer,
};
pub use wait::{
    wait_period_elapsed, WaitPeriodError, WaitPeriodStatus, DEFAULT_ATTRIBUTES_CONCURRENCY,
};
