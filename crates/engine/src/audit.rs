use crate::executor::Memo;
use core_types::{AnalyticsQuery, QueryAuditTrail, render_filters};
use registry::MetricRegistry;
use timerange::render_time_range;

/// Builds the audit trail for one executed query: which metrics ran, which
/// tables they touched, and how the scope was narrowed. Table order follows
/// the request order with duplicates removed.
pub fn build_audit_trail(
    query: &AnalyticsQuery,
    registry: &MetricRegistry,
    memo: &Memo,
) -> QueryAuditTrail {
    let mut source_tables: Vec<String> = Vec::new();
    for id in &query.metrics {
        if let Some(definition) = registry.get(id)
            && !source_tables.contains(&definition.source_table)
        {
            source_tables.push(definition.source_table.clone());
        }
    }

    let mut degraded_metrics: Vec<String> = memo
        .iter()
        .filter(|(_, value)| value.degraded)
        .map(|(id, _)| id.clone())
        .collect();
    degraded_metrics.sort();

    let time_range_summary = match &query.time_range {
        Some(range) => render_time_range(range),
        None => "All time".to_string(),
    };

    QueryAuditTrail {
        metrics_used: query.metrics.clone(),
        source_tables,
        filters_summary: render_filters(&query.filters),
        time_range_summary,
        degraded_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{
        Calculation, FilterBuilder, MetricCategory, MetricDefinition, MetricUnit, MetricValue,
        TimePreset, TimeRange,
    };

    fn count_metric(id: &str, table: &str) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Cases,
            MetricUnit::Count,
            table,
            Calculation::SimpleCount {
                table: table.to_string(),
            },
        )
    }

    #[test]
    fn source_tables_follow_request_order_without_duplicates() {
        let registry = MetricRegistry::new(vec![
            count_metric("a", "cases"),
            count_metric("b", "invoices"),
            count_metric("c", "cases"),
        ])
        .unwrap();
        let query = AnalyticsQuery::new(
            "org1",
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
        );

        let trail = build_audit_trail(&query, &registry, &Memo::new());
        assert_eq!(trail.source_tables, vec!["invoices", "cases"]);
        assert_eq!(trail.metrics_used, vec!["b", "a", "c"]);
    }

    #[test]
    fn summaries_cover_filters_range_and_degradation() {
        let registry = MetricRegistry::new(vec![count_metric("a", "cases")]).unwrap();
        let query = AnalyticsQuery::new("org1", vec!["a".to_string()])
            .with_filters(FilterBuilder::new().eq("status", "open").build())
            .with_time_range(TimeRange::preset(TimePreset::Last30Days));

        let mut memo = Memo::new();
        memo.insert("a".to_string(), MetricValue::degraded());

        let trail = build_audit_trail(&query, &registry, &memo);
        assert_eq!(trail.filters_summary, "status = open");
        assert_eq!(trail.time_range_summary, "Last 30 Days");
        assert_eq!(trail.degraded_metrics, vec!["a"]);
    }

    #[test]
    fn absent_range_renders_all_time() {
        let registry = MetricRegistry::new(vec![count_metric("a", "cases")]).unwrap();
        let query = AnalyticsQuery::new("org1", vec!["a".to_string()]);

        let trail = build_audit_trail(&query, &registry, &Memo::new());
        assert_eq!(trail.time_range_summary, "All time");
        assert_eq!(trail.filters_summary, "No filters applied");
    }
}
