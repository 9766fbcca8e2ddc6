use crate::error::DataSourceError;
use crate::source::{DataSource, RowScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Filter, FilterOperator};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// An in-memory data source over JSON rows.
///
/// Used by the test suite and by offline demo runs of the binary. Applies
/// the same scope semantics as the PostgreSQL implementation: implicit
/// tenant predicate, AND-composed filters, inclusive time window. Counts
/// every request per table so tests can assert the single-evaluation
/// invariant.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    failing_tables: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table. Each row must be a JSON object; anything else is
    /// silently skipped.
    pub fn with_table(mut self, name: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }

    /// Marks a table as unavailable: every request against it fails. Lets
    /// tests exercise the degrade-to-zero policy.
    pub fn with_failing_table(mut self, name: &str) -> Self {
        self.failing_tables.insert(name.to_string());
        self
    }

    /// How many requests have been issued against a table.
    pub fn table_calls(&self, table: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(table).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// A small seeded fixture so the binary is demoable without a database.
    pub fn seeded() -> Self {
        Self::new()
            .with_table(
                "cases",
                vec![
                    json!({"organization_id": "org1", "status": "open", "created_at": "2024-03-01T09:00:00Z", "opened_at": "2024-03-01T09:00:00Z", "closed_at": null}),
                    json!({"organization_id": "org1", "status": "open", "created_at": "2024-03-05T10:00:00Z", "opened_at": "2024-03-05T10:00:00Z", "closed_at": null}),
                    json!({"organization_id": "org1", "status": "closed", "created_at": "2024-01-10T08:00:00Z", "opened_at": "2024-01-10T08:00:00Z", "closed_at": "2024-02-09T08:00:00Z"}),
                    json!({"organization_id": "org1", "status": "closed", "created_at": "2024-02-01T08:00:00Z", "opened_at": "2024-02-01T08:00:00Z", "closed_at": "2024-02-21T08:00:00Z"}),
                    json!({"organization_id": "org2", "status": "open", "created_at": "2024-03-02T09:00:00Z", "opened_at": "2024-03-02T09:00:00Z", "closed_at": null}),
                ],
            )
            .with_table(
                "invoices",
                vec![
                    json!({"organization_id": "org1", "status": "paid", "total": 1200.0, "balance_due": 0.0, "created_at": "2024-02-20T00:00:00Z", "issued_at": "2024-02-20T00:00:00Z", "paid_at": "2024-03-01T00:00:00Z"}),
                    json!({"organization_id": "org1", "status": "sent", "total": 800.0, "balance_due": 800.0, "created_at": "2024-03-05T00:00:00Z", "issued_at": "2024-03-05T00:00:00Z", "paid_at": null}),
                ],
            )
            .with_table(
                "invoice_payments",
                vec![
                    json!({"organization_id": "org1", "amount": 700.0, "created_at": "2024-03-01T00:00:00Z"}),
                    json!({"organization_id": "org1", "amount": 500.0, "created_at": "2024-03-08T00:00:00Z"}),
                    json!({"organization_id": "org2", "amount": 50.0, "created_at": "2024-03-08T00:00:00Z"}),
                ],
            )
            .with_table(
                "tasks",
                vec![
                    json!({"organization_id": "org1", "status": "completed", "created_at": "2024-03-01T09:00:00Z", "completed_at": "2024-03-02T09:00:00Z"}),
                    json!({"organization_id": "org1", "status": "overdue", "created_at": "2024-02-15T09:00:00Z", "completed_at": null}),
                ],
            )
            .with_table(
                "time_entries",
                vec![
                    json!({"organization_id": "org1", "billable": true, "hours": 6.5, "created_at": "2024-03-04T00:00:00Z"}),
                    json!({"organization_id": "org1", "billable": false, "hours": 1.5, "created_at": "2024-03-04T00:00:00Z"}),
                ],
            )
            .with_table(
                "documents",
                vec![
                    json!({"organization_id": "org1", "size_bytes": 250000, "created_at": "2024-03-03T00:00:00Z"}),
                    json!({"organization_id": "org1", "size_bytes": 1250000, "created_at": "2024-03-06T00:00:00Z"}),
                ],
            )
            .with_table(
                "leads",
                vec![
                    json!({"organization_id": "org1", "status": "qualified", "estimated_value": 5000.0, "created_at": "2024-03-02T00:00:00Z"}),
                    json!({"organization_id": "org1", "status": "converted", "estimated_value": 3000.0, "created_at": "2024-02-25T00:00:00Z"}),
                ],
            )
            .with_table(
                "expenses",
                vec![
                    json!({"organization_id": "org1", "billable": false, "amount": 150.0, "created_at": "2024-03-04T00:00:00Z"}),
                    json!({"organization_id": "org1", "billable": true, "amount": 90.0, "created_at": "2024-03-07T00:00:00Z"}),
                ],
            )
    }

    fn rows_matching(
        &self,
        table: &str,
        scope: &RowScope,
    ) -> Result<Vec<&Map<String, Value>>, DataSourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(table.to_string()).or_insert(0) += 1;
        }
        if self.failing_tables.contains(table) {
            return Err(DataSourceError::TableUnavailable(table.to_string()));
        }
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| DataSourceError::TableUnavailable(table.to_string()))?;

        Ok(rows.iter().filter(|row| matches_scope(row, scope)).collect())
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn count(&self, table: &str, scope: &RowScope) -> Result<u64, DataSourceError> {
        Ok(self.rows_matching(table, scope)?.len() as u64)
    }

    async fn fetch_numeric(
        &self,
        table: &str,
        column: &str,
        scope: &RowScope,
    ) -> Result<Vec<Option<f64>>, DataSourceError> {
        Ok(self
            .rows_matching(table, scope)?
            .into_iter()
            .map(|row| row.get(column).and_then(Value::as_f64))
            .collect())
    }

    async fn fetch_timestamp_pairs(
        &self,
        table: &str,
        start_column: &str,
        end_column: &str,
        scope: &RowScope,
    ) -> Result<Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>, DataSourceError> {
        Ok(self
            .rows_matching(table, scope)?
            .into_iter()
            .map(|row| {
                (
                    parse_timestamp(row.get(start_column)),
                    parse_timestamp(row.get(end_column)),
                )
            })
            .collect())
    }
}

fn matches_scope(row: &Map<String, Value>, scope: &RowScope) -> bool {
    let tenant_matches = row
        .get("organization_id")
        .and_then(Value::as_str)
        .is_some_and(|org| org == scope.organization_id);
    if !tenant_matches {
        return false;
    }

    if let Some(window) = &scope.window {
        let Some(instant) = parse_timestamp(row.get(&window.field)) else {
            return false;
        };
        if instant < window.start || instant > window.end {
            return false;
        }
    }

    scope
        .filters
        .iter()
        .all(|filter| matches_filter(row.get(&filter.field), filter))
}

fn matches_filter(cell: Option<&Value>, filter: &Filter) -> bool {
    match filter.operator {
        FilterOperator::Eq => cell.is_some_and(|v| values_equal(v, &filter.value)),
        FilterOperator::Neq => !cell.is_some_and(|v| values_equal(v, &filter.value)),
        FilterOperator::Gt => compare(cell, &filter.value) == Some(Ordering::Greater),
        FilterOperator::Gte => matches!(
            compare(cell, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::Lt => compare(cell, &filter.value) == Some(Ordering::Less),
        FilterOperator::Lte => matches!(
            compare(cell, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::In => match (&filter.value, cell) {
            (Value::Array(items), Some(v)) => items.iter().any(|item| values_equal(v, item)),
            _ => false,
        },
        FilterOperator::Nin => match (&filter.value, cell) {
            (Value::Array(items), Some(v)) => !items.iter().any(|item| values_equal(v, item)),
            (Value::Array(_), None) => true,
            _ => false,
        },
        FilterOperator::Like => match (cell.and_then(Value::as_str), filter.value.as_str()) {
            (Some(text), Some(pattern)) => like_match(text, pattern),
            _ => false,
        },
        FilterOperator::IsNull => cell.is_none_or(Value::is_null),
        FilterOperator::IsNotNull => cell.is_some_and(|v| !v.is_null()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // Numbers compare numerically so 100 == 100.0.
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn compare(cell: Option<&Value>, target: &Value) -> Option<Ordering> {
    let cell = cell?;
    if let (Some(x), Some(y)) = (cell.as_f64(), target.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (cell.as_str(), target.as_str()) {
        (Some(a), Some(b)) => {
            // Date-shaped strings compare as instants.
            match (parse_rfc3339(a), parse_rfc3339(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

/// Case-insensitive match with `%` wildcards, mirroring SQL `ILIKE`.
fn like_match(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    if parts.len() == 1 {
        return text == pattern;
    }

    let mut position = 0;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            if !text.starts_with(part) {
                return false;
            }
            position = part.len();
        } else if index == parts.len() - 1 {
            return text.len() >= position + part.len() && text[position..].ends_with(part);
        } else {
            match text[position..].find(part) {
                Some(found) => position += found + part.len(),
                None => return false,
            }
        }
    }
    true
}

fn parse_timestamp(cell: Option<&Value>) -> Option<DateTime<Utc>> {
    cell.and_then(Value::as_str).and_then(parse_rfc3339)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::FilterBuilder;

    fn source() -> MemoryDataSource {
        MemoryDataSource::seeded()
    }

    #[tokio::test]
    async fn count_is_tenant_scoped() {
        let source = source();
        let org1 = source.count("cases", &RowScope::new("org1")).await.unwrap();
        let org2 = source.count("cases", &RowScope::new("org2")).await.unwrap();

        assert_eq!(org1, 4);
        assert_eq!(org2, 1);
    }

    #[tokio::test]
    async fn filters_and_together() {
        let source = source();
        let scope = RowScope::new("org1")
            .with_filters(FilterBuilder::new().eq("status", "open").build());
        assert_eq!(source.count("cases", &scope).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn window_excludes_rows_outside_bounds() {
        let source = source();
        let scope = RowScope::new("org1").with_window(Some(crate::source::TimeWindow {
            field: "created_at".to_string(),
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap(),
        }));
        assert_eq!(source.count("cases", &scope).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fetch_numeric_preserves_nulls() {
        let source = MemoryDataSource::new().with_table(
            "invoices",
            vec![
                json!({"organization_id": "org1", "total": 100.0}),
                json!({"organization_id": "org1", "total": null}),
            ],
        );
        let values = source
            .fetch_numeric("invoices", "total", &RowScope::new("org1"))
            .await
            .unwrap();
        assert_eq!(values, vec![Some(100.0), None]);
    }

    #[tokio::test]
    async fn failing_table_errors() {
        let source = MemoryDataSource::seeded().with_failing_table("cases");
        assert!(source.count("cases", &RowScope::new("org1")).await.is_err());
    }

    #[tokio::test]
    async fn calls_are_counted_per_table() {
        let source = source();
        let scope = RowScope::new("org1");
        source.count("cases", &scope).await.unwrap();
        source.count("cases", &scope).await.unwrap();
        source.count("tasks", &scope).await.unwrap();

        assert_eq!(source.table_calls("cases"), 2);
        assert_eq!(source.table_calls("tasks"), 1);
        assert_eq!(source.table_calls("leads"), 0);
    }

    #[test]
    fn like_matches_sql_semantics() {
        assert!(like_match("Smith & Co", "smith%"));
        assert!(like_match("Smith & Co", "%co"));
        assert!(like_match("Smith & Co", "%&%"));
        assert!(like_match("Smith & Co", "smith & co"));
        assert!(!like_match("Smith & Co", "jones%"));
    }
}
