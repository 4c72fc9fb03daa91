//! Usage-counter aggregation and the metrics sink contract (§4.5.3).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Per-cycle counters, keyed by machine type (`started`/`stopped`) or by
/// `"old-new"` type pair (`resized`).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UsageCounters {
    pub started: HashMap<String, u64>,
    pub stopped: HashMap<String, u64>,
    pub resized: HashMap<String, u64>,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&mut self, machine_type: &str) {
        *self.started.entry(machine_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_stopped(&mut self, machine_type: &str) {
        *self.stopped.entry(machine_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_resized(&mut self, old_type: &str, new_type: &str) {
        let key = format!("{old_type}-{new_type}");
        *self.resized.entry(key).or_insert(0) += 1;
    }

    /// Merges another cycle's (or region's) counters into this one.
    pub fn merge(&mut self, other: &UsageCounters) {
        for (k, v) in &other.started {
            *self.started.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.stopped {
            *self.stopped.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.resized {
            *self.resized.entry(k.clone()).or_insert(0) += v;
        }
    }
}

/// One hit against a schedule/period, aggregated for `use_metrics` flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleMetricHit {
    pub schedule_name: String,
    pub period_name: Option<String>,
    pub count: u64,
}

/// Accumulates schedule-evaluation hits across a cycle, stamped with the
/// instant the cycle began.
#[derive(Debug, Clone)]
pub struct SchedulerMetrics {
    pub cycle_started_at: DateTime<Utc>,
    hits: HashMap<(String, Option<String>), u64>,
}

impl SchedulerMetrics {
    pub fn new(cycle_started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_started_at,
            hits: HashMap::new(),
        }
    }

    pub fn record_hit(&mut self, schedule_name: &str, period_name: Option<&str>) {
        let key = (schedule_name.to_string(), period_name.map(str::to_string));
        *self.hits.entry(key).or_insert(0) += 1;
    }

    pub fn into_hits(self) -> Vec<ScheduleMetricHit> {
        self.hits
            .into_iter()
            .map(|((schedule_name, period_name), count)| ScheduleMetricHit {
                schedule_name,
                period_name,
                count,
            })
            .collect()
    }
}

/// A sink for per-cycle metrics, decoupled from any concrete telemetry
/// backend (Prometheus, CloudWatch, ...). Implementations live in the
/// foundation crate or a host application.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Flushes schedule-evaluation hits gathered during one cycle.
    async fn flush_schedule_metrics(&self, hits: &[ScheduleMetricHit]);

    /// Publishes the aggregated usage counters for one cycle.
    async fn publish_usage_counters(&self, service: &str, counters: &UsageCounters);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_started_increments_counter() {
        let mut counters = UsageCounters::new();
        counters.record_started("m5.large");
        counters.record_started("m5.large");
        counters.record_started("m5.xlarge");
        assert_eq!(counters.started.get("m5.large"), Some(&2));
        assert_eq!(counters.started.get("m5.xlarge"), Some(&1));
    }

    #[test]
    fn record_resized_keys_by_old_new_pair() {
        let mut counters = UsageCounters::new();
        counters.record_resized("m5.large", "m5.xlarge");
        assert_eq!(counters.resized.get("m5.large-m5.xlarge"), Some(&1));
    }

    #[test]
    fn merge_sums_overlapping_keys() {
        let mut a = UsageCounters::new();
        a.record_started("m5.large");
        let mut b = UsageCounters::new();
        b.record_started("m5.large");
        b.record_stopped("m5.large");
        a.merge(&b);
        assert_eq!(a.started.get("m5.large"), Some(&2));
        assert_eq!(a.stopped.get("m5.large"), Some(&1));
    }

    #[test]
    fn scheduler_metrics_aggregates_hits_by_schedule_and_period() {
        let started = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        let mut metrics = SchedulerMetrics::new(started);
        metrics.record_hit("office-hours", Some("business-hours"));
        metrics.record_hit("office-hours", Some("business-hours"));
        metrics.record_hit("office-hours", None);

        let hits = metrics.into_hits();
        assert_eq!(hits.len(), 2);
        let business = hits
            .iter()
            .find(|h| h.period_name.as_deref() == Some("business-hours"))
            .unwrap();
        assert_eq!(business.count, 2);
    }
}
