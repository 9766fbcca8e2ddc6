use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The comparison operators supported by the data-source contract.
///
/// All filters on a query AND together; there is no OR composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// The symbol used when rendering a filter into an audit summary.
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Neq => "≠",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => "≥",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "≤",
            FilterOperator::In => "IN",
            FilterOperator::Nin => "NOT IN",
            FilterOperator::Like => "LIKE",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator consumes its value. `IsNull`/`IsNotNull` ignore it.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// A single predicate on a source table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// A fluent builder that accumulates filters in insertion order.
///
/// Field names are not validated here; the data source is the authority on
/// which columns exist.
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filters: Vec<Filter>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, operator: FilterOperator, value: Value) -> Self {
        self.filters.push(Filter::new(field, operator, value));
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Eq, value.into())
    }

    pub fn neq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Neq, value.into())
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Gt, value.into())
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Gte, value.into())
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Lt, value.into())
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FilterOperator::Lte, value.into())
    }

    pub fn is_in(self, field: &str, values: Vec<Value>) -> Self {
        self.push(field, FilterOperator::In, Value::Array(values))
    }

    pub fn not_in(self, field: &str, values: Vec<Value>) -> Self {
        self.push(field, FilterOperator::Nin, Value::Array(values))
    }

    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.push(field, FilterOperator::Like, Value::String(pattern.into()))
    }

    pub fn is_null(self, field: &str) -> Self {
        self.push(field, FilterOperator::IsNull, Value::Null)
    }

    pub fn is_not_null(self, field: &str) -> Self {
        self.push(field, FilterOperator::IsNotNull, Value::Null)
    }

    /// Appends an inclusive `[start, end]` window on a timestamp column as a
    /// gte/lte pair.
    pub fn in_date_range(self, field: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.gte(field, start.to_rfc3339()).lte(field, end.to_rfc3339())
    }

    /// Appends an inclusive `[min, max]` window on a numeric column.
    pub fn in_range(self, field: &str, min: f64, max: f64) -> Self {
        self.gte(field, min).lte(field, max)
    }

    /// Concatenates another builder's filters after this builder's own.
    pub fn merge(mut self, other: FilterBuilder) -> Self {
        self.filters.extend(other.filters);
        self
    }

    /// Returns the accumulated filters as an immutable snapshot.
    pub fn build(self) -> Vec<Filter> {
        self.filters
    }
}

/// Renders a filter list into the human-readable audit summary form,
/// e.g. `status = open AND amount > 100`.
///
/// Array values are truncated to their first 3 elements with a trailing
/// ellipsis. An empty list renders as `"No filters applied"`.
pub fn render_filters(filters: &[Filter]) -> String {
    if filters.is_empty() {
        return "No filters applied".to_string();
    }

    filters
        .iter()
        .map(render_filter)
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_filter(filter: &Filter) -> String {
    if !filter.operator.takes_value() {
        return format!("{} {}", filter.field, filter.operator.symbol());
    }
    format!(
        "{} {} {}",
        filter.field,
        filter.operator.symbol(),
        render_value(&filter.value)
    )
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let mut shown: Vec<String> = items.iter().take(3).map(render_value).collect();
            if items.len() > 3 {
                shown.push("…".to_string());
            }
            format!("[{}]", shown.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_preserves_insertion_order() {
        let filters = FilterBuilder::new()
            .eq("status", "open")
            .gt("amount", 100)
            .build();

        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].field, "status");
        assert_eq!(filters[0].operator, FilterOperator::Eq);
        assert_eq!(filters[1].field, "amount");
        assert_eq!(filters[1].operator, FilterOperator::Gt);
    }

    #[test]
    fn merge_concatenates() {
        let a = FilterBuilder::new().eq("status", "open");
        let b = FilterBuilder::new().is_not_null("closed_at");
        let filters = a.merge(b).build();

        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].operator, FilterOperator::IsNotNull);
    }

    #[test]
    fn renders_summary_with_and() {
        let filters = FilterBuilder::new()
            .eq("status", "open")
            .gte("amount", 100)
            .build();

        assert_eq!(render_filters(&filters), "status = open AND amount ≥ 100");
    }

    #[test]
    fn renders_empty_as_no_filters() {
        assert_eq!(render_filters(&[]), "No filters applied");
    }

    #[test]
    fn long_arrays_are_truncated_in_summary() {
        let filters = FilterBuilder::new()
            .is_in("status", vec![json!("a"), json!("b"), json!("c"), json!("d")])
            .build();

        assert_eq!(render_filters(&filters), "status IN [a, b, c, …]");
    }

    #[test]
    fn null_checks_render_without_value() {
        let filters = FilterBuilder::new().is_null("closed_at").build();
        assert_eq!(render_filters(&filters), "closed_at IS NULL");
    }
}
