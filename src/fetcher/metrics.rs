use prometheus::core::Collector;
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

pub const SYNCED_STATE_LABEL: &str = "state";

pub const LOADED_META: &str = "loaded";
pub const FAILED_META: &str = "failed";
pub const NO_BUCKET_INDEX: &str = "no-bucket-index";
pub const CORRUPTED_BUCKET_INDEX: &str = "corrupted-bucket-index";
pub const MIN_TIME_EXCLUDED_META: &str = "min-time-excluded";
pub const MARKED_FOR_DELETION_META: &str = "marked-for-deletion";
pub const DUPLICATE_META: &str = "duplicate";
pub const RETENTION_EXPIRED_META: &str = "retention-expired";
pub const OUT_OF_ORDER_EXCLUDED_META: &str = "out-of-order-excluded";

/// States always published by the synced gauge, even when zero
pub const DEFAULT_SYNCED_STATES: &[&str] = &[
    LOADED_META,
    FAILED_META,
    NO_BUCKET_INDEX,
    CORRUPTED_BUCKET_INDEX,
    MIN_TIME_EXCLUDED_META,
    MARKED_FOR_DELETION_META,
    DUPLICATE_META,
    RETENTION_EXPIRED_META,
    OUT_OF_ORDER_EXCLUDED_META,
];

const SYNC_DURATION_BUCKETS: &[f64] = &[0.01, 0.1, 0.3, 0.6, 1.0, 3.0, 6.0, 9.0, 20.0, 30.0, 60.0, 90.0, 120.0, 240.0];

/// Gauge vector whose values are staged per transaction and only become
/// visible on [`TxGaugeVec::submit`].
///
/// Every transaction starts from zero, so a state that is not set during a
/// fetch is published as 0 instead of keeping a stale value.
pub struct TxGaugeVec {
    published: GaugeVec,
    defaults: Vec<String>,
    staged: Mutex<BTreeMap<String, f64>>,
}

impl TxGaugeVec {
    pub fn new(opts: Opts, label: &str, defaults: &[&str]) -> prometheus::Result<Self> {
        Ok(Self {
            published: GaugeVec::new(opts, &[label])?,
            defaults: defaults.iter().map(|s| s.to_string()).collect(),
            staged: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn collector(&self) -> GaugeVec {
        self.published.clone()
    }

    /// Start a new transaction; only the default states are staged, at zero.
    pub fn reset_tx(&self) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.clear();
        for state in &self.defaults {
            staged.insert(state.clone(), 0.0);
        }
    }

    pub fn set(&self, state: &str, value: f64) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.insert(state.to_string(), value);
    }

    pub fn add(&self, state: &str, delta: f64) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        *staged.entry(state.to_string()).or_insert(0.0) += delta;
    }

    pub fn inc(&self, state: &str) {
        self.add(state, 1.0);
    }

    /// Value staged in the current transaction
    pub fn staged(&self, state: &str) -> Option<f64> {
        let staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.get(state).copied()
    }

    /// Publish the staged transaction
    pub fn submit(&self) {
        let staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        self.published.reset();
        for (state, value) in staged.iter() {
            self.published.with_label_values(&[state.as_str()]).set(*value);
        }
    }

    /// Currently published value for a state
    pub fn published(&self, state: &str) -> f64 {
        let families = self.published.collect();
        families
            .iter()
            .flat_map(|mf| mf.get_metric())
            .find(|m| m.get_label().iter().any(|l| l.get_value() == state))
            .map(|m| m.get_gauge().get_value())
            .unwrap_or(0.0)
    }
}

impl fmt::Debug for TxGaugeVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("TxGaugeVec").field("staged", &*staged).finish()
    }
}

/// Metrics of one tenant's metadata fetcher
pub struct FetcherMetrics {
    pub syncs: IntCounter,
    pub sync_failures: IntCounter,
    pub sync_duration: Histogram,
    pub synced: TxGaugeVec,
}

impl FetcherMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let syncs = IntCounter::new(
            "blocks_meta_syncs_total",
            "Total blocks metadata synchronization attempts",
        )?;
        let sync_failures = IntCounter::new(
            "blocks_meta_sync_failures_total",
            "Total blocks metadata synchronization failures",
        )?;
        let sync_duration = Histogram::with_opts(
            HistogramOpts::new(
                "blocks_meta_sync_duration_seconds",
                "Duration of the blocks metadata synchronization in seconds",
            )
            .buckets(SYNC_DURATION_BUCKETS.to_vec()),
        )?;
        let synced = TxGaugeVec::new(
            Opts::new("blocks_meta_synced", "Number of block metadata synced"),
            SYNCED_STATE_LABEL,
            DEFAULT_SYNCED_STATES,
        )?;

        registry.register(Box::new(syncs.clone()))?;
        registry.register(Box::new(sync_failures.clone()))?;
        registry.register(Box::new(sync_duration.clone()))?;
        registry.register(Box::new(synced.collector()))?;

        Ok(Self {
            syncs,
            sync_failures,
            sync_duration,
            synced,
        })
    }

    pub fn reset_tx(&self) {
        self.synced.reset_tx();
    }

    pub fn submit(&self) {
        self.synced.submit();
    }
}
