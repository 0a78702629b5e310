//! Per-tenant metric registries with aggregated scraping
//!
//! Every tenant gets its own [`Registry`] so its collectors can be dropped
//! as a unit when the tenant goes away. A scrape merges all live
//! registries: samples with the same family name and label set are summed,
//! so the output never carries a tenant label and never keeps the values of
//! a removed tenant.

use prometheus::proto::{Metric, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::RwLock;

type LabelSet = Vec<(String, String)>;

#[derive(Default)]
pub struct TenantRegistries {
    registries: RwLock<BTreeMap<String, Registry>>,
}

impl TenantRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a tenant's registry
    pub fn add_tenant(&self, tenant: impl Into<String>, registry: Registry) {
        let mut registries = self.registries.write().unwrap_or_else(|e| e.into_inner());
        registries.insert(tenant.into(), registry);
    }

    /// Drop a tenant and everything it contributed to the aggregate
    pub fn remove_tenant(&self, tenant: &str) -> bool {
        let mut registries = self.registries.write().unwrap_or_else(|e| e.into_inner());
        registries.remove(tenant).is_some()
    }

    pub fn tenants(&self) -> Vec<String> {
        let registries = self.registries.read().unwrap_or_else(|e| e.into_inner());
        registries.keys().cloned().collect()
    }

    /// Gather every tenant and sum samples by family and label set.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let registries = self.registries.read().unwrap_or_else(|e| e.into_inner());

        let mut families: BTreeMap<String, (MetricFamily, BTreeMap<LabelSet, Metric>)> = BTreeMap::new();
        for registry in registries.values() {
            for family in registry.gather() {
                let (_, series) = families.entry(family.get_name().to_string()).or_insert_with(|| {
                    let mut empty = MetricFamily::default();
                    empty.set_name(family.get_name().to_string());
                    empty.set_help(family.get_help().to_string());
                    empty.set_field_type(family.get_field_type());
                    (empty, BTreeMap::new())
                });

                for metric in family.get_metric() {
                    let labels = label_set(metric);
                    match series.get_mut(&labels) {
                        Some(sum) => merge(family.get_field_type(), sum, metric),
                        None => {
                            series.insert(labels, metric.clone());
                        }
                    }
                }
            }
        }

        families
            .into_values()
            .map(|(mut family, series)| {
                for metric in series.into_values() {
                    family.mut_metric().push(metric);
                }
                family
            })
            .collect()
    }

    /// Aggregate in the Prometheus text exposition format
    pub fn encode_text(&self) -> prometheus::Result<String> {
        encode(&self.gather())
    }
}

/// Render families in the Prometheus text exposition format
pub fn encode(families: &[MetricFamily]) -> prometheus::Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(families, &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

fn label_set(metric: &Metric) -> LabelSet {
    let mut labels: LabelSet = metric
        .get_label()
        .iter()
        .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
        .collect();
    labels.sort();
    labels
}

fn merge(kind: MetricType, sum: &mut Metric, other: &Metric) {
    match kind {
        MetricType::COUNTER => {
            let value = sum.get_counter().get_value() + other.get_counter().get_value();
            sum.mut_counter().set_value(value);
        }
        MetricType::GAUGE => {
            let value = sum.get_gauge().get_value() + other.get_gauge().get_value();
            sum.mut_gauge().set_value(value);
        }
        MetricType::UNTYPED => {
            let value = sum.get_untyped().get_value() + other.get_untyped().get_value();
            sum.mut_untyped().set_value(value);
        }
        MetricType::HISTOGRAM => {
            let other = other.get_histogram();
            let hist = sum.mut_histogram();
            hist.set_sample_count(hist.get_sample_count() + other.get_sample_count());
            hist.set_sample_sum(hist.get_sample_sum() + other.get_sample_sum());
            // Tenants register identical bucket layouts.
            for (bucket, add) in hist.mut_bucket().iter_mut().zip(other.get_bucket()) {
                bucket.set_cumulative_count(bucket.get_cumulative_count() + add.get_cumulative_count());
            }
        }
        MetricType::SUMMARY => {
            let other = other.get_summary();
            let summary = sum.mut_summary();
            summary.set_sample_count(summary.get_sample_count() + other.get_sample_count());
            summary.set_sample_sum(summary.get_sample_sum() + other.get_sample_sum());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Histogram, HistogramOpts, IntCounter, IntGaugeVec, Opts};

    struct TenantMetrics {
        registry: Registry,
        syncs: IntCounter,
        synced: IntGaugeVec,
        duration: Histogram,
    }

    fn tenant_metrics() -> TenantMetrics {
        let registry = Registry::new();
        let syncs = IntCounter::new("syncs_total", "syncs").unwrap();
        let synced = IntGaugeVec::new(Opts::new("synced", "synced"), &["state"]).unwrap();
        let duration = Histogram::with_opts(
            HistogramOpts::new("duration_seconds", "duration").buckets(vec![1.0, 10.0]),
        )
        .unwrap();
        registry.register(Box::new(syncs.clone())).unwrap();
        registry.register(Box::new(synced.clone())).unwrap();
        registry.register(Box::new(duration.clone())).unwrap();
        TenantMetrics {
            registry,
            syncs,
            synced,
            duration,
        }
    }

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families.iter().find(|f| f.get_name() == name).unwrap()
    }

    fn gauge(families: &[MetricFamily], state: &str) -> f64 {
        family(families, "synced")
            .get_metric()
            .iter()
            .find(|m| m.get_label()[0].get_value() == state)
            .map(|m| m.get_gauge().get_value())
            .unwrap()
    }

    #[test]
    fn test_sum_then_remove_tenant() {
        let registries = TenantRegistries::new();
        let tenants: Vec<_> = (1..=3).map(|_| tenant_metrics()).collect();

        for (i, t) in tenants.iter().enumerate() {
            let n = (i + 1) as i64;
            t.syncs.inc_by(n as u64);
            t.synced.with_label_values(&["loaded"]).set(10 * n);
            t.synced.with_label_values(&["failed"]).set(n);
            t.duration.observe(0.5 * n as f64);
            registries.add_tenant(format!("user-{}", n), t.registry.clone());
        }

        let families = registries.gather();
        assert_eq!(family(&families, "syncs_total").get_metric()[0].get_counter().get_value(), 6.0);
        assert_eq!(gauge(&families, "loaded"), 60.0);
        assert_eq!(gauge(&families, "failed"), 6.0);

        let hist = family(&families, "duration_seconds").get_metric()[0].get_histogram();
        assert_eq!(hist.get_sample_count(), 3);
        assert_eq!(hist.get_sample_sum(), 3.0);
        // 0.5 and 1.0 fall in the first bucket, 1.5 in the second.
        assert_eq!(hist.get_bucket()[0].get_cumulative_count(), 2);
        assert_eq!(hist.get_bucket()[1].get_cumulative_count(), 3);

        assert!(registries.remove_tenant("user-2"));
        assert!(!registries.remove_tenant("user-2"));

        let families = registries.gather();
        assert_eq!(family(&families, "syncs_total").get_metric()[0].get_counter().get_value(), 4.0);
        assert_eq!(gauge(&families, "loaded"), 40.0);
        assert_eq!(gauge(&families, "failed"), 4.0);
        let hist = family(&families, "duration_seconds").get_metric()[0].get_histogram();
        assert_eq!(hist.get_sample_count(), 2);
        assert_eq!(hist.get_sample_sum(), 2.0);
        assert_eq!(registries.tenants(), vec!["user-1".to_string(), "user-3".to_string()]);
    }

    #[test]
    fn test_label_sets_stay_separate() {
        let registries = TenantRegistries::new();
        let a = tenant_metrics();
        let b = tenant_metrics();
        a.synced.with_label_values(&["loaded"]).set(3);
        b.synced.with_label_values(&["duplicate"]).set(2);
        registries.add_tenant("a", a.registry.clone());
        registries.add_tenant("b", b.registry.clone());

        let families = registries.gather();
        assert_eq!(family(&families, "synced").get_metric().len(), 2);
        assert_eq!(gauge(&families, "loaded"), 3.0);
        assert_eq!(gauge(&families, "duplicate"), 2.0);
    }

    #[test]
    fn test_encode_text() {
        let registries = TenantRegistries::new();
        let t = tenant_metrics();
        t.syncs.inc();
        registries.add_tenant("user-1", t.registry.clone());

        let text = registries.encode_text().unwrap();
        assert!(text.contains("# TYPE syncs_total counter"));
        assert!(text.contains("syncs_total 1"));
    }
}
