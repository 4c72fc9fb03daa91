//! A [`MetricsSink`] that emits one structured `tracing` event per metric
//! line, suitable for scraping from structured logs without hard-wiring a
//! concrete telemetry backend into the kernel.

use async_trait::async_trait;
use tracing::info;

use scheduler_kernel::{MetricsSink, ScheduleMetricHit, UsageCounters};

/// Logs usage counters and schedule-hit metrics via `tracing`, one event
/// per counter key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn flush_schedule_metrics(&self, hits: &[ScheduleMetricHit]) {
        for hit in hits {
            info!(
                schedule = %hit.schedule_name,
                period = hit.period_name.as_deref().unwrap_or("-"),
                count = hit.count,
                "schedule metric"
            );
        }
    }

    async fn publish_usage_counters(&self, service: &str, counters: &UsageCounters) {
        for (machine_type, count) in &counters.started {
            info!(%service, %machine_type, count, "usage.started");
        }
        for (machine_type, count) in &counters.stopped {
            info!(%service, %machine_type, count, "usage.stopped");
        }
        for (type_pair, count) in &counters.resized {
            info!(%service, %type_pair, count, "usage.resized");
        }
    }
}
