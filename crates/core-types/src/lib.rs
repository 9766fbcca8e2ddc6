pub mod error;
pub mod filter;
pub mod metric;
pub mod query;
pub mod result;

// Re-export the core types to provide a clean public API.
pub use error::CoreError;
pub use filter::{Filter, FilterBuilder, FilterOperator, render_filters};
pub use metric::{
    AuditInfo, Calculation, CompositeTerm, DataFreshness, DurationUnit, MetricCategory,
    MetricDefinition, MetricUnit, RatioOperand, Sign, parse_composite, referenced_metrics,
};
pub use query::{AnalyticsQuery, DEFAULT_TIME_FIELD, Granularity, TimePreset, TimeRange};
pub use result::{
    AnalyticsResult, MetricValue, PeriodComparison, QueryAuditTrail, ResultMetadata,
    TimeSeriesPoint,
};
