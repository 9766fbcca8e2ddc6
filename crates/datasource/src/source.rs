use crate::error::DataSourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::Filter;

/// An inclusive window on a timestamp column, applied in addition to the
/// scope's filters.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub field: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The scope of one data-source request.
///
/// `organization_id` is always present and always applied as a top-level
/// equality predicate on the organization column; implementations must never
/// issue a query without it. All filters AND together.
#[derive(Debug, Clone, PartialEq)]
pub struct RowScope {
    pub organization_id: String,
    pub filters: Vec<Filter>,
    pub window: Option<TimeWindow>,
}

impl RowScope {
    pub fn new(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            filters: Vec::new(),
            window: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_window(mut self, window: Option<TimeWindow>) -> Self {
        self.window = window;
        self
    }
}

/// The minimum capability contract the calculation executor requires from
/// the relational store. Read-only; implementations never write.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Exact count of rows matching the scope.
    async fn count(&self, table: &str, scope: &RowScope) -> Result<u64, DataSourceError>;

    /// One numeric column across matching rows, as a flat list. Null cells
    /// come back as `None`, never coerced to 0 here.
    async fn fetch_numeric(
        &self,
        table: &str,
        column: &str,
        scope: &RowScope,
    ) -> Result<Vec<Option<f64>>, DataSourceError>;

    /// Two timestamp columns across matching rows, for elapsed-time
    /// calculations. Either side of a pair may be null.
    async fn fetch_timestamp_pairs(
        &self,
        table: &str,
        start_column: &str,
        end_column: &str,
        scope: &RowScope,
    ) -> Result<Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>, DataSourceError>;
}
