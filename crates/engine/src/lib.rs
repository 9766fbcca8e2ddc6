//! # Meridian Query Engine
//!
//! The evaluation core: takes an [`AnalyticsQuery`], plans the dependency
//! closure of the requested metrics, executes the plan against the data
//! source, and assembles the result envelope with its audit trail.
//!
//! ## Architectural Principles
//!
//! - **Plan Then Execute:** Every query is first expanded into topological
//!   levels (leaves before dependents) with cycles rejected up front, then
//!   executed level by level with bounded concurrency inside each level.
//! - **Evaluate Once:** A per-query memo guarantees each metric id is
//!   computed at most once per query, no matter how many requested metrics
//!   share it.
//! - **Degrade, Don't Fail:** A data-source failure on one metric degrades
//!   that metric (and its dependents) to zero with a visible marker; it
//!   never aborts the rest of the query.

pub mod aggregate;
pub mod audit;
pub mod error;
pub mod executor;
pub mod plan;

pub use aggregate::{Aggregation, aggregate, safe_ratio};
pub use error::EngineError;
pub use plan::{EvaluationPlan, build_plan};

use crate::audit::build_audit_trail;
use crate::executor::{CalculationExecutor, QueryScope};
use chrono::Utc;
use configuration::EngineSettings;
use core_types::{
    AnalyticsQuery, AnalyticsResult, Granularity, MetricValue, PeriodComparison, ResultMetadata,
    TimePreset, TimeRange, TimeSeriesPoint,
};
use datasource::{DataSource, TimeWindow};
use futures::stream::{self, StreamExt};
use registry::MetricRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use timerange::{ResolvedRange, bucket_ranges, default_granularity, resolve};

/// The metric calculation engine.
///
/// Cheap to clone-by-Arc internally; one instance is shared across all
/// queries and holds no per-query state.
pub struct QueryEngine {
    registry: Arc<MetricRegistry>,
    executor: CalculationExecutor,
    settings: EngineSettings,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<MetricRegistry>,
        source: Arc<dyn DataSource>,
        settings: EngineSettings,
    ) -> Self {
        let executor = CalculationExecutor::new(
            source,
            Arc::clone(&registry),
            settings.max_concurrent_fetches,
        );
        Self {
            registry,
            executor,
            settings,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Evaluates one query and returns the single-row result envelope.
    pub async fn query(&self, query: &AnalyticsQuery) -> Result<AnalyticsResult, EngineError> {
        let started = Instant::now();
        let executed_at = Utc::now();

        let plan = build_plan(&self.registry, &query.metrics)?;
        let window = match &query.time_range {
            Some(range) => {
                let resolved = resolve(range, Utc::now())?;
                Some(TimeWindow {
                    field: query.time_field().to_string(),
                    start: resolved.start,
                    end: resolved.end,
                })
            }
            None => None,
        };

        let scope = QueryScope { query, window };
        let memo = self.executor.evaluate_plan(&plan, &scope).await;

        let mut row: BTreeMap<String, MetricValue> = BTreeMap::new();
        for id in &query.metrics {
            row.insert(
                id.clone(),
                memo.get(id).copied().unwrap_or_else(MetricValue::degraded),
            );
        }

        let audit_trail = build_audit_trail(query, &self.registry, &memo);
        Ok(AnalyticsResult {
            data: vec![row],
            metadata: ResultMetadata {
                executed_at,
                execution_time_ms: started.elapsed().as_millis() as u64,
                row_count: 1,
                truncated: false,
                audit_trail,
            },
        })
    }

    /// Like [`Self::query`], but abandoned with [`EngineError::DeadlineExceeded`]
    /// when the deadline elapses first.
    pub async fn query_with_deadline(
        &self,
        query: &AnalyticsQuery,
        deadline: Duration,
    ) -> Result<AnalyticsResult, EngineError> {
        match tokio::time::timeout(deadline, self.query(query)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::DeadlineExceeded),
        }
    }

    /// Convenience: one metric, no filters, all time.
    pub async fn metric_value(
        &self,
        metric_id: &str,
        organization_id: &str,
    ) -> Result<MetricValue, EngineError> {
        let query = AnalyticsQuery::new(organization_id, vec![metric_id.to_string()]);
        let result = self.query(&query).await?;
        Ok(result.value(metric_id).unwrap_or_else(MetricValue::degraded))
    }

    /// Convenience: several metrics at once, keyed by id.
    pub async fn metric_values(
        &self,
        metric_ids: &[String],
        organization_id: &str,
    ) -> Result<BTreeMap<String, MetricValue>, EngineError> {
        let query = AnalyticsQuery::new(organization_id, metric_ids.to_vec());
        let result = self.query(&query).await?;
        Ok(result.data.into_iter().next().unwrap_or_default())
    }

    /// Evaluates one metric per bucket across the query's time range.
    ///
    /// Bucket size comes from the explicit argument, then the range's own
    /// granularity, then the elapsed-days heuristic. `query.limit` caps the
    /// number of buckets. Buckets are independent queries and run with the
    /// same bounded concurrency as within-query fetches; output order
    /// matches bucket order.
    pub async fn time_series(
        &self,
        metric_id: &str,
        query: &AnalyticsQuery,
        granularity: Option<Granularity>,
    ) -> Result<Vec<TimeSeriesPoint>, EngineError> {
        let range = query
            .time_range
            .clone()
            .unwrap_or_else(|| TimeRange::preset(TimePreset::Last30Days));
        let resolved = resolve(&range, Utc::now())?;
        let granularity = granularity
            .or_else(|| range.granularity())
            .unwrap_or_else(|| default_granularity(&resolved));

        let mut buckets = bucket_ranges(&resolved, granularity);
        if let Some(limit) = query.limit {
            buckets.truncate(limit);
        }

        let points: Vec<Result<TimeSeriesPoint, EngineError>> =
            stream::iter(buckets.into_iter().map(|bucket| {
                let mut sub_query = query.clone();
                sub_query.metrics = vec![metric_id.to_string()];
                sub_query.time_range = Some(TimeRange::custom(bucket.start, bucket.end));
                sub_query.limit = None;
                async move {
                    let result = self.query(&sub_query).await?;
                    Ok(TimeSeriesPoint {
                        bucket_start: bucket.start,
                        bucket_end: bucket.end,
                        value: result
                            .value(metric_id)
                            .unwrap_or_else(MetricValue::degraded),
                    })
                }
            }))
            .buffered(self.settings.max_concurrent_fetches)
            .collect()
            .await;

        points.into_iter().collect()
    }

    /// Evaluates one metric over the query's range and over the immediately
    /// preceding period of equal length.
    pub async fn compare_periods(
        &self,
        metric_id: &str,
        query: &AnalyticsQuery,
    ) -> Result<PeriodComparison, EngineError> {
        let range = query
            .time_range
            .clone()
            .unwrap_or_else(|| TimeRange::preset(TimePreset::Last30Days));
        let current = resolve(&range, Utc::now())?;
        let previous = preceding_period(&current);

        let mut current_query = query.clone();
        current_query.metrics = vec![metric_id.to_string()];
        current_query.time_range = Some(TimeRange::custom(current.start, current.end));

        let mut previous_query = current_query.clone();
        previous_query.time_range = Some(TimeRange::custom(previous.start, previous.end));

        let (current_result, previous_result) =
            futures::join!(self.query(&current_query), self.query(&previous_query));
        let current_value = current_result?
            .value(metric_id)
            .unwrap_or_else(MetricValue::degraded);
        let previous_value = previous_result?
            .value(metric_id)
            .unwrap_or_else(MetricValue::degraded);

        let change = current_value.value - previous_value.value;
        Ok(PeriodComparison {
            current: current_value,
            previous: previous_value,
            change,
            change_percent: safe_ratio(change, previous_value.value, true),
        })
    }
}

/// The period of equal duration immediately before `current`, ending 1ms
/// before it starts.
fn preceding_period(current: &ResolvedRange) -> ResolvedRange {
    let span = current.end - current.start;
    let end = current.start - chrono::Duration::milliseconds(1);
    ResolvedRange {
        start: end - span,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn preceding_period_is_adjacent_and_equal_length() {
        let current = ResolvedRange {
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        };
        let previous = preceding_period(&current);

        assert_eq!(current.start - previous.end, chrono::Duration::milliseconds(1));
        assert_eq!(previous.end - previous.start, current.end - current.start);
    }
}
