use crate::error::DataSourceError;
use crate::source::{DataSource, RowScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Filter, FilterOperator};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

/// The tenant column every table in the store carries.
const ORGANIZATION_COLUMN: &str = "organization_id";

/// The production data source: dynamically built, fully parameterized SQL
/// over a shared `PgPool`.
///
/// Table and column names come from the static metric catalog, never from
/// callers, and are double-quoted on the way into SQL. Filter values are
/// always bound parameters.
#[derive(Debug, Clone)]
pub struct PostgresDataSource {
    pool: PgPool,
}

impl PostgresDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn scoped_builder(prefix: String, scope: &RowScope) -> Result<QueryBuilder<'_, Postgres>, DataSourceError> {
        let mut builder = QueryBuilder::new(prefix);
        builder.push(" WHERE ").push(quote_ident(ORGANIZATION_COLUMN)).push(" = ");
        builder.push_bind(scope.organization_id.clone());

        for filter in &scope.filters {
            push_filter(&mut builder, filter)?;
        }

        if let Some(window) = &scope.window {
            builder.push(" AND ").push(quote_ident(&window.field)).push(" >= ");
            builder.push_bind(window.start);
            builder.push(" AND ").push(quote_ident(&window.field)).push(" <= ");
            builder.push_bind(window.end);
        }

        Ok(builder)
    }
}

#[async_trait]
impl DataSource for PostgresDataSource {
    async fn count(&self, table: &str, scope: &RowScope) -> Result<u64, DataSourceError> {
        tracing::debug!(table, organization = %scope.organization_id, "issuing scoped row count");
        let prefix = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let mut builder = Self::scoped_builder(prefix, scope)?;

        let row = builder.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_numeric(
        &self,
        table: &str,
        column: &str,
        scope: &RowScope,
    ) -> Result<Vec<Option<f64>>, DataSourceError> {
        tracing::debug!(table, column, "issuing scoped column fetch");
        let prefix = format!(
            "SELECT CAST({} AS NUMERIC) FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        let mut builder = Self::scoped_builder(prefix, scope)?;

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let cell: Option<Decimal> = row.try_get(0)?;
            values.push(cell.and_then(|d| d.to_f64()));
        }
        Ok(values)
    }

    async fn fetch_timestamp_pairs(
        &self,
        table: &str,
        start_column: &str,
        end_column: &str,
        scope: &RowScope,
    ) -> Result<Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>, DataSourceError> {
        let prefix = format!(
            "SELECT {}, {} FROM {}",
            quote_ident(start_column),
            quote_ident(end_column),
            quote_ident(table)
        );
        let mut builder = Self::scoped_builder(prefix, scope)?;

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let start: Option<DateTime<Utc>> = row.try_get(0)?;
            let end: Option<DateTime<Utc>> = row.try_get(1)?;
            pairs.push((start, end));
        }
        Ok(pairs)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &Filter,
) -> Result<(), DataSourceError> {
    // An empty IN list matches nothing; an empty NOT IN list matches
    // everything. Neither is expressible as `IN ()`.
    if let (FilterOperator::In | FilterOperator::Nin, Value::Array(items)) =
        (filter.operator, &filter.value)
        && items.is_empty()
    {
        builder.push(match filter.operator {
            FilterOperator::In => " AND FALSE",
            _ => " AND TRUE",
        });
        return Ok(());
    }

    builder.push(" AND ").push(quote_ident(&filter.field));

    match filter.operator {
        FilterOperator::Eq => {
            builder.push(" = ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::Neq => {
            builder.push(" <> ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::Gt => {
            builder.push(" > ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::Gte => {
            builder.push(" >= ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::Lt => {
            builder.push(" < ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::Lte => {
            builder.push(" <= ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::In | FilterOperator::Nin => {
            let Value::Array(items) = &filter.value else {
                return Err(DataSourceError::UnsupportedFilterValue {
                    field: filter.field.clone(),
                });
            };
            builder.push(if filter.operator == FilterOperator::In {
                " IN ("
            } else {
                " NOT IN ("
            });
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                push_bind_value(builder, item, &filter.field)?;
            }
            builder.push(")");
        }
        FilterOperator::Like => {
            // Case-insensitive per the filter contract.
            builder.push(" ILIKE ");
            push_bind_value(builder, &filter.value, &filter.field)?;
        }
        FilterOperator::IsNull => {
            builder.push(" IS NULL");
        }
        FilterOperator::IsNotNull => {
            builder.push(" IS NOT NULL");
        }
    }

    Ok(())
}

fn push_bind_value(
    builder: &mut QueryBuilder<'_, Postgres>,
    value: &Value,
    field: &str,
) -> Result<(), DataSourceError> {
    match value {
        Value::String(s) => {
            // Date-shaped strings (from `in_date_range`) bind as timestamps
            // so they compare against timestamptz columns.
            if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
                builder.push_bind(instant.with_timezone(&Utc));
            } else {
                builder.push_bind(s.clone());
            }
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                builder.push_bind(int);
            } else if let Some(float) = n.as_f64() {
                builder.push_bind(float);
            } else {
                return Err(DataSourceError::UnsupportedFilterValue {
                    field: field.to_string(),
                });
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => {
            return Err(DataSourceError::UnsupportedFilterValue {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("cases"), "\"cases\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
