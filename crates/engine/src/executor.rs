use crate::aggregate::{Aggregation, aggregate, safe_ratio};
use crate::plan::EvaluationPlan;
use core_types::{
    AnalyticsQuery, Calculation, Filter, MetricValue, RatioOperand, referenced_metrics,
};
use datasource::{DataSource, DataSourceError, RowScope, TimeWindow};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use registry::MetricRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-query memo: each distinct metric id is evaluated at most once per
/// query, so two references to the same metric always see the same value.
/// Confined to a single query's execution; never shared across queries.
pub type Memo = HashMap<String, MetricValue>;

/// The per-query evaluation context: the caller's query plus the time window
/// resolved once up front.
#[derive(Debug)]
pub struct QueryScope<'a> {
    pub query: &'a AnalyticsQuery,
    pub window: Option<TimeWindow>,
}

/// Evaluates calculation recipes against the data source.
///
/// Leaf recipes issue one scoped data-source call each; ratio and composite
/// recipes read their dependencies from the memo, which the evaluation plan
/// guarantees were computed in an earlier level. A failed fetch degrades the
/// metric to zero with a `degraded` marker instead of failing the query.
pub struct CalculationExecutor {
    source: Arc<dyn DataSource>,
    registry: Arc<MetricRegistry>,
    max_concurrent: usize,
}

impl CalculationExecutor {
    pub fn new(
        source: Arc<dyn DataSource>,
        registry: Arc<MetricRegistry>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            source,
            registry,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Evaluates a full plan level by level. Metrics within one level are
    /// independent and run concurrently, bounded by `max_concurrent`.
    pub async fn evaluate_plan(&self, plan: &EvaluationPlan, scope: &QueryScope<'_>) -> Memo {
        let mut memo = Memo::new();

        for level in &plan.levels {
            let results: Vec<(String, MetricValue)> = {
                let memo_ref = &memo;
                stream::iter(level.iter().map(|id| async move {
                    (id.clone(), self.evaluate_metric(id, scope, memo_ref).await)
                }))
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await
            };
            for (id, value) in results {
                memo.insert(id, value);
            }
        }

        memo
    }

    /// Evaluates one registered metric. A metric is degraded when its own
    /// fetch failed or when any metric it reads was itself degraded.
    async fn evaluate_metric(
        &self,
        id: &str,
        scope: &QueryScope<'_>,
        memo: &Memo,
    ) -> MetricValue {
        let Some(definition) = self.registry.get(id) else {
            // The planner only schedules registered metrics.
            return MetricValue::degraded();
        };

        match self
            .evaluate_calculation(id, &definition.calculation, scope, memo)
            .await
        {
            Ok(value) => {
                let dependency_degraded = referenced_metrics(&definition.calculation)
                    .iter()
                    .any(|dep| memo.get(dep).is_some_and(|v| v.degraded));
                MetricValue {
                    value,
                    degraded: dependency_degraded,
                }
            }
            Err(error) => {
                tracing::warn!(
                    metric = id,
                    error = %error,
                    "metric degraded to zero after data source failure"
                );
                MetricValue::degraded()
            }
        }
    }

    /// Dispatches on the calculation variant. Boxed because ratio operands
    /// may carry inline recipes, which recurse.
    fn evaluate_calculation<'a>(
        &'a self,
        metric_id: &'a str,
        calculation: &'a Calculation,
        scope: &'a QueryScope<'a>,
        memo: &'a Memo,
    ) -> BoxFuture<'a, Result<f64, DataSourceError>> {
        Box::pin(async move {
            match calculation {
                Calculation::SimpleCount { table } => {
                    let row_scope = self.scope_for(&[], scope);
                    Ok(self.source.count(table, &row_scope).await? as f64)
                }
                Calculation::ConditionalCount { table, conditions } => {
                    let row_scope = self.scope_for(conditions, scope);
                    Ok(self.source.count(table, &row_scope).await? as f64)
                }
                Calculation::Sum {
                    table,
                    field,
                    conditions,
                } => {
                    let row_scope = self.scope_for(conditions, scope);
                    let values = self.source.fetch_numeric(table, field, &row_scope).await?;
                    Ok(aggregate(Aggregation::Sum, &values))
                }
                Calculation::Average {
                    table,
                    field,
                    conditions,
                } => {
                    let row_scope = self.scope_for(conditions, scope);
                    let values = self.source.fetch_numeric(table, field, &row_scope).await?;
                    Ok(aggregate(Aggregation::Average, &values))
                }
                Calculation::Duration {
                    table,
                    start_field,
                    end_field,
                    conditions,
                    unit,
                } => {
                    let row_scope = self.scope_for(conditions, scope);
                    let pairs = self
                        .source
                        .fetch_timestamp_pairs(table, start_field, end_field, &row_scope)
                        .await?;
                    // Only rows with both timestamps contribute.
                    let elapsed: Vec<Option<f64>> = pairs
                        .into_iter()
                        .filter_map(|(start, end)| match (start, end) {
                            (Some(start), Some(end)) => {
                                Some(Some((end - start).num_milliseconds() as f64 / unit.millis()))
                            }
                            _ => None,
                        })
                        .collect();
                    Ok(aggregate(Aggregation::Average, &elapsed))
                }
                Calculation::Ratio {
                    numerator,
                    denominator,
                    percentage,
                } => {
                    let numerator = self
                        .operand_value(metric_id, numerator, scope, memo)
                        .await?;
                    let denominator = self
                        .operand_value(metric_id, denominator, scope, memo)
                        .await?;
                    Ok(safe_ratio(numerator, denominator, *percentage))
                }
                Calculation::Composite { .. } => {
                    let Some(terms) = self.registry.composite_terms(metric_id) else {
                        // The registry parses every composite at load time.
                        return Ok(0.0);
                    };
                    let mut total = 0.0;
                    for term in terms {
                        let value = match memo.get(&term.metric_id) {
                            Some(resolved) => resolved.value,
                            None => {
                                tracing::warn!(
                                    metric = metric_id,
                                    term = %term.metric_id,
                                    "unresolved composite term contributes 0"
                                );
                                0.0
                            }
                        };
                        match term.sign {
                            core_types::Sign::Plus => total += value,
                            core_types::Sign::Minus => total -= value,
                        }
                    }
                    Ok(total)
                }
            }
        })
    }

    async fn operand_value(
        &self,
        metric_id: &str,
        operand: &RatioOperand,
        scope: &QueryScope<'_>,
        memo: &Memo,
    ) -> Result<f64, DataSourceError> {
        match operand {
            RatioOperand::MetricRef(id) => match memo.get(id) {
                Some(resolved) => Ok(resolved.value),
                None => {
                    tracing::warn!(
                        metric = metric_id,
                        operand = %id,
                        "unresolved ratio operand contributes 0"
                    );
                    Ok(0.0)
                }
            },
            RatioOperand::Inline(inner) => {
                self.evaluate_calculation(metric_id, inner, scope, memo)
                    .await
            }
        }
    }

    /// Composes the scope for one leaf call: tenant id (always), the
    /// recipe's own conditions, the query-level filters, and the resolved
    /// time window when the query carries one.
    fn scope_for(&self, conditions: &[Filter], scope: &QueryScope<'_>) -> RowScope {
        let mut filters = conditions.to_vec();
        filters.extend(scope.query.filters.iter().cloned());
        RowScope::new(&scope.query.organization_id)
            .with_filters(filters)
            .with_window(scope.window.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::build_plan;
    use core_types::{MetricCategory, MetricDefinition, MetricUnit};
    use datasource::MemoryDataSource;
    use serde_json::json;

    fn sum_metric(id: &str, table: &str, field: &str) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Finances,
            MetricUnit::Currency,
            table,
            Calculation::Sum {
                table: table.to_string(),
                field: field.to_string(),
                conditions: Vec::new(),
            },
        )
    }

    fn composite(id: &str, expression: &str, deps: &[&str]) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Finances,
            MetricUnit::Currency,
            "virtual",
            Calculation::Composite {
                expression: expression.to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
            },
        )
    }

    fn single_value_source(table: &str, field: &str, value: f64) -> MemoryDataSource {
        MemoryDataSource::new().with_table(
            table,
            vec![json!({"organization_id": "org1", field: value})],
        )
    }

    async fn run(
        registry: MetricRegistry,
        source: MemoryDataSource,
        metrics: &[&str],
    ) -> Memo {
        let registry = Arc::new(registry);
        let executor = CalculationExecutor::new(Arc::new(source), Arc::clone(&registry), 4);
        let query =
            AnalyticsQuery::new("org1", metrics.iter().map(|m| m.to_string()).collect());
        let plan = build_plan(&registry, &query.metrics).unwrap();
        let scope = QueryScope {
            query: &query,
            window: None,
        };
        executor.evaluate_plan(&plan, &scope).await
    }

    #[tokio::test]
    async fn composite_folds_signed_terms() {
        let registry = MetricRegistry::new(vec![
            sum_metric("a", "ta", "v"),
            sum_metric("b", "tb", "v"),
            sum_metric("c", "tc", "v"),
            composite("net", "a + b - c", &["a", "b", "c"]),
        ])
        .unwrap();
        let source = MemoryDataSource::new()
            .with_table("ta", vec![json!({"organization_id": "org1", "v": 10.0})])
            .with_table("tb", vec![json!({"organization_id": "org1", "v": 5.0})])
            .with_table("tc", vec![json!({"organization_id": "org1", "v": 3.0})]);

        let memo = run(registry, source, &["net"]).await;
        assert_eq!(memo.get("net").unwrap().value, 12.0);
    }

    #[tokio::test]
    async fn missing_composite_term_contributes_zero() {
        let registry = MetricRegistry::new(vec![
            sum_metric("a", "ta", "v"),
            sum_metric("b", "tb", "v"),
            composite("net", "a + b - c", &["a", "b", "c"]),
        ])
        .unwrap();
        let source = MemoryDataSource::new()
            .with_table("ta", vec![json!({"organization_id": "org1", "v": 10.0})])
            .with_table("tb", vec![json!({"organization_id": "org1", "v": 5.0})]);

        let memo = run(registry, source, &["net"]).await;
        assert_eq!(memo.get("net").unwrap().value, 15.0);
    }

    #[tokio::test]
    async fn ratio_with_inline_denominator() {
        let registry = MetricRegistry::new(vec![
            sum_metric("billable", "hours", "billable_hours"),
            MetricDefinition::new(
                "utilization",
                "Utilization",
                MetricCategory::Productivity,
                MetricUnit::Percentage,
                "hours",
                Calculation::Ratio {
                    numerator: RatioOperand::MetricRef("billable".to_string()),
                    denominator: RatioOperand::Inline(Box::new(Calculation::Sum {
                        table: "hours".to_string(),
                        field: "all_hours".to_string(),
                        conditions: Vec::new(),
                    })),
                    percentage: true,
                },
            )
            .with_dependencies(&["billable"]),
        ])
        .unwrap();
        let source = MemoryDataSource::new().with_table(
            "hours",
            vec![json!({"organization_id": "org1", "billable_hours": 30.0, "all_hours": 40.0})],
        );

        let memo = run(registry, source, &["utilization"]).await;
        assert_eq!(memo.get("utilization").unwrap().value, 75.0);
    }

    #[tokio::test]
    async fn zero_denominator_yields_zero() {
        let registry = MetricRegistry::new(vec![
            sum_metric("n", "tn", "v"),
            sum_metric("d", "td", "v"),
            MetricDefinition::new(
                "rate",
                "Rate",
                MetricCategory::Finances,
                MetricUnit::Percentage,
                "tn",
                Calculation::Ratio {
                    numerator: RatioOperand::MetricRef("n".to_string()),
                    denominator: RatioOperand::MetricRef("d".to_string()),
                    percentage: true,
                },
            )
            .with_dependencies(&["n", "d"]),
        ])
        .unwrap();
        let source = MemoryDataSource::new()
            .with_table("tn", vec![json!({"organization_id": "org1", "v": 10.0})])
            .with_table("td", Vec::new());

        let memo = run(registry, source, &["rate"]).await;
        let rate = memo.get("rate").unwrap();
        assert_eq!(rate.value, 0.0);
        assert!(rate.value.is_finite());
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_zero() {
        let registry = MetricRegistry::new(vec![sum_metric("a", "ta", "v")]).unwrap();
        let source = MemoryDataSource::new().with_failing_table("ta");

        let memo = run(registry, source, &["a"]).await;
        let value = memo.get("a").unwrap();
        assert_eq!(value.value, 0.0);
        assert!(value.degraded);
    }

    #[tokio::test]
    async fn degradation_propagates_to_dependents() {
        let registry = MetricRegistry::new(vec![
            sum_metric("a", "ta", "v"),
            sum_metric("b", "tb", "v"),
            composite("net", "a + b", &["a", "b"]),
        ])
        .unwrap();
        let source = MemoryDataSource::new()
            .with_failing_table("ta")
            .with_table("tb", vec![json!({"organization_id": "org1", "v": 5.0})]);

        let memo = run(registry, source, &["net"]).await;
        let net = memo.get("net").unwrap();
        assert_eq!(net.value, 5.0);
        assert!(net.degraded);
    }

    #[tokio::test]
    async fn duration_averages_rows_with_both_timestamps() {
        let registry = MetricRegistry::new(vec![MetricDefinition::new(
            "turnaround",
            "Turnaround",
            MetricCategory::Productivity,
            MetricUnit::Hours,
            "tasks",
            Calculation::Duration {
                table: "tasks".to_string(),
                start_field: "created_at".to_string(),
                end_field: "completed_at".to_string(),
                conditions: Vec::new(),
                unit: core_types::DurationUnit::Hours,
            },
        )])
        .unwrap();
        let source = MemoryDataSource::new().with_table(
            "tasks",
            vec![
                json!({"organization_id": "org1", "created_at": "2024-03-01T00:00:00Z", "completed_at": "2024-03-01T06:00:00Z"}),
                json!({"organization_id": "org1", "created_at": "2024-03-02T00:00:00Z", "completed_at": "2024-03-02T12:00:00Z"}),
                json!({"organization_id": "org1", "created_at": "2024-03-03T00:00:00Z", "completed_at": null}),
            ],
        );

        let memo = run(registry, source, &["turnaround"]).await;
        assert_eq!(memo.get("turnaround").unwrap().value, 9.0);
    }
}
