use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One computed metric value.
///
/// `degraded` distinguishes "the data genuinely sums to zero" from "the
/// underlying fetch failed and the engine degraded to zero". Callers that
/// care about correctness over resilience should check it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub degraded: bool,
}

impl MetricValue {
    pub fn ok(value: f64) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            value: 0.0,
            degraded: true,
        }
    }
}

/// A deterministic description of how a query's numbers were derived.
///
/// Reconstructable purely from the query and the registry; it describes
/// intent, not what the data source happened to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAuditTrail {
    /// The metric ids the caller requested, in request order.
    pub metrics_used: Vec<String>,
    /// Deduped union of the requested metrics' declared source tables.
    pub source_tables: Vec<String>,
    /// Human-readable rendering of the query-level filters.
    pub filters_summary: String,
    /// Human-readable rendering of the time range.
    pub time_range_summary: String,
    /// Metric ids whose values were degraded to zero by a fetch failure.
    pub degraded_metrics: Vec<String>,
}

/// Execution metadata stamped on every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub executed_at: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub row_count: usize,
    pub truncated: bool,
    pub audit_trail: QueryAuditTrail,
}

/// The result envelope for one analytics query: exactly one row mapping
/// metric id to value, plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub data: Vec<BTreeMap<String, MetricValue>>,
    pub metadata: ResultMetadata,
}

impl AnalyticsResult {
    /// The value of one metric in the single result row, if present.
    pub fn value(&self, metric_id: &str) -> Option<MetricValue> {
        self.data.first().and_then(|row| row.get(metric_id)).copied()
    }
}

/// One bucket of a time-series evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub value: MetricValue,
}

/// The outcome of comparing one metric across two adjacent periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub current: MetricValue,
    pub previous: MetricValue,
    pub change: f64,
    /// Percent change versus the previous period; 0 when the previous value
    /// is 0, mirroring the ratio zero-division rule.
    pub change_percent: f64,
}
