use crate::filter::Filter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The timestamp column a query's time range applies to when the caller does
/// not name one.
pub const DEFAULT_TIME_FIELD: &str = "created_at";

/// A named relative time window, resolved against "now" by the timerange
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreset {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
    Last7Days,
    Last30Days,
    Last90Days,
    Last365Days,
    AllTime,
}

impl TimePreset {
    /// The human label used in audit summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TimePreset::Today => "Today",
            TimePreset::Yesterday => "Yesterday",
            TimePreset::ThisWeek => "This Week",
            TimePreset::LastWeek => "Last Week",
            TimePreset::ThisMonth => "This Month",
            TimePreset::LastMonth => "Last Month",
            TimePreset::ThisQuarter => "This Quarter",
            TimePreset::LastQuarter => "Last Quarter",
            TimePreset::ThisYear => "This Year",
            TimePreset::LastYear => "Last Year",
            TimePreset::Last7Days => "Last 7 Days",
            TimePreset::Last30Days => "Last 30 Days",
            TimePreset::Last90Days => "Last 90 Days",
            TimePreset::Last365Days => "Last 365 Days",
            TimePreset::AllTime => "All Time",
        }
    }
}

impl FromStr for TimePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(TimePreset::Today),
            "yesterday" => Ok(TimePreset::Yesterday),
            "this_week" => Ok(TimePreset::ThisWeek),
            "last_week" => Ok(TimePreset::LastWeek),
            "this_month" => Ok(TimePreset::ThisMonth),
            "last_month" => Ok(TimePreset::LastMonth),
            "this_quarter" => Ok(TimePreset::ThisQuarter),
            "last_quarter" => Ok(TimePreset::LastQuarter),
            "this_year" => Ok(TimePreset::ThisYear),
            "last_year" => Ok(TimePreset::LastYear),
            "last_7_days" => Ok(TimePreset::Last7Days),
            "last_30_days" => Ok(TimePreset::Last30Days),
            "last_90_days" => Ok(TimePreset::Last90Days),
            "last_365_days" => Ok(TimePreset::Last365Days),
            "all_time" => Ok(TimePreset::AllTime),
            other => Err(format!("unknown time preset '{other}'")),
        }
    }
}

/// The bucket size for time-series output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// A symbolic time range: a preset resolved relative to "now", or explicit
/// inclusive bounds supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeRange {
    Preset {
        preset: TimePreset,
        granularity: Option<Granularity>,
    },
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Option<Granularity>,
    },
}

impl TimeRange {
    pub fn preset(preset: TimePreset) -> Self {
        TimeRange::Preset {
            preset,
            granularity: None,
        }
    }

    pub fn custom(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange::Custom {
            start,
            end,
            granularity: None,
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            TimeRange::Preset { granularity, .. } | TimeRange::Custom { granularity, .. } => {
                *granularity
            }
        }
    }
}

/// One request against the query engine: which metrics to evaluate and the
/// scope to evaluate them in.
///
/// `organization_id` is mandatory. Every data-source call issued while
/// serving the query carries it as an implicit equality predicate; this is
/// the multi-tenancy invariant and is not bypassable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub time_range: Option<TimeRange>,
    pub time_field: Option<String>,
    pub organization_id: String,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl AnalyticsQuery {
    pub fn new(organization_id: &str, metrics: Vec<String>) -> Self {
        Self {
            metrics,
            filters: Vec::new(),
            time_range: None,
            time_field: None,
            organization_id: organization_id.to_string(),
            order_by: None,
            limit: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_time_field(mut self, field: &str) -> Self {
        self.time_field = Some(field.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The timestamp column the time range applies to.
    pub fn time_field(&self) -> &str {
        self.time_field.as_deref().unwrap_or(DEFAULT_TIME_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_round_trips_through_from_str() {
        let preset: TimePreset = "last_30_days".parse().unwrap();
        assert_eq!(preset, TimePreset::Last30Days);
        assert_eq!(preset.label(), "Last 30 Days");
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!("last_14_days".parse::<TimePreset>().is_err());
    }

    #[test]
    fn time_field_defaults_to_created_at() {
        let query = AnalyticsQuery::new("org1", vec!["cases.total".to_string()]);
        assert_eq!(query.time_field(), "created_at");

        let query = query.with_time_field("closed_at");
        assert_eq!(query.time_field(), "closed_at");
    }
}
