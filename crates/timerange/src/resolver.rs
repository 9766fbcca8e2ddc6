use crate::error::TimeRangeError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use core_types::{TimePreset, TimeRange};
use serde::{Deserialize, Serialize};

/// A concrete, inclusive `[start, end]` window produced by resolving a
/// symbolic time range against a fixed "now".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ResolvedRange {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whole elapsed days between start and end, used by the granularity
    /// heuristic.
    pub fn elapsed_days(&self) -> i64 {
        self.duration().num_days()
    }
}

/// Resolves a symbolic time range into concrete bounds.
///
/// Pure given `now`: callers inject the clock rather than this function
/// reading a global one. Presets use the calendar-day boundary of `now` as
/// "today"; weeks start on Sunday; `this_*` presets run from the period
/// start through the end of today.
pub fn resolve(range: &TimeRange, now: DateTime<Utc>) -> Result<ResolvedRange, TimeRangeError> {
    match range {
        TimeRange::Custom { start, end, .. } => {
            if start > end {
                return Err(TimeRangeError::InvalidCustomRange {
                    start: *start,
                    end: *end,
                });
            }
            Ok(ResolvedRange {
                start: *start,
                end: *end,
            })
        }
        TimeRange::Preset { preset, .. } => Ok(resolve_preset(*preset, now.date_naive())),
    }
}

fn resolve_preset(preset: TimePreset, today: NaiveDate) -> ResolvedRange {
    match preset {
        TimePreset::Today => span(today, today),
        TimePreset::Yesterday => {
            let y = today - Duration::days(1);
            span(y, y)
        }
        TimePreset::ThisWeek => span(week_start(today), today),
        TimePreset::LastWeek => {
            let start = week_start(today) - Duration::days(7);
            span(start, start + Duration::days(6))
        }
        TimePreset::ThisMonth => span(month_start(today), today),
        TimePreset::LastMonth => {
            let end = month_start(today) - Duration::days(1);
            span(month_start(end), end)
        }
        TimePreset::ThisQuarter => span(quarter_start(today), today),
        TimePreset::LastQuarter => {
            let end = quarter_start(today) - Duration::days(1);
            span(quarter_start(end), end)
        }
        TimePreset::ThisYear => span(year_start(today), today),
        TimePreset::LastYear => {
            let end = year_start(today) - Duration::days(1);
            span(year_start(end), end)
        }
        TimePreset::Last7Days => last_n_days(today, 7),
        TimePreset::Last30Days => last_n_days(today, 30),
        TimePreset::Last90Days => last_n_days(today, 90),
        TimePreset::Last365Days => last_n_days(today, 365),
        TimePreset::AllTime => ResolvedRange {
            start: DateTime::UNIX_EPOCH,
            end: day_end(today),
        },
    }
}

/// `[today - (n-1) days, end of today]`: exactly n calendar days, today
/// inclusive.
fn last_n_days(today: NaiveDate, n: i64) -> ResolvedRange {
    span(today - Duration::days(n - 1), today)
}

fn span(first_day: NaiveDate, last_day: NaiveDate) -> ResolvedRange {
    ResolvedRange {
        start: day_start(first_day),
        end: day_end(last_day),
    }
}

pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub(crate) fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::milliseconds(1)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    // with_day(1) cannot fail for a valid date.
    date.with_day(1).unwrap_or(date)
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// Renders a time range for the audit summary: the preset's human label, or
/// `"<start> - <end>"` for custom bounds. Callers render an absent range as
/// `"All time"`.
pub fn render_time_range(range: &TimeRange) -> String {
    match range {
        TimeRange::Preset { preset, .. } => preset.label().to_string(),
        TimeRange::Custom { start, end, .. } => format!(
            "{} - {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // A Friday afternoon.
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap() + Duration::milliseconds(i64::from(ms))
    }

    #[test]
    fn today_spans_one_calendar_day() {
        let r = resolve(&TimeRange::preset(TimePreset::Today), now()).unwrap();
        assert_eq!(r.start, at(2024, 3, 15, 0, 0, 0, 0));
        assert_eq!(r.end, at(2024, 3, 15, 23, 59, 59, 999));
    }

    #[test]
    fn last_7_days_includes_today() {
        let r = resolve(&TimeRange::preset(TimePreset::Last7Days), now()).unwrap();
        assert_eq!(r.start, at(2024, 3, 9, 0, 0, 0, 0));
        assert_eq!(r.end, at(2024, 3, 15, 23, 59, 59, 999));
    }

    #[test]
    fn last_30_days_spans_exactly_thirty_days() {
        let r = resolve(&TimeRange::preset(TimePreset::Last30Days), now()).unwrap();
        assert_eq!(r.start, at(2024, 2, 15, 0, 0, 0, 0));
        // 30 calendar days inclusive, millisecond-inclusive end.
        assert_eq!(r.duration() + Duration::milliseconds(1), Duration::days(30));
    }

    #[test]
    fn weeks_start_on_sunday() {
        // 2024-03-15 is a Friday; the enclosing week starts Sunday 03-10.
        let r = resolve(&TimeRange::preset(TimePreset::ThisWeek), now()).unwrap();
        assert_eq!(r.start, at(2024, 3, 10, 0, 0, 0, 0));

        let r = resolve(&TimeRange::preset(TimePreset::LastWeek), now()).unwrap();
        assert_eq!(r.start, at(2024, 3, 3, 0, 0, 0, 0));
        assert_eq!(r.end, at(2024, 3, 9, 23, 59, 59, 999));
    }

    #[test]
    fn last_month_covers_the_previous_calendar_month() {
        let r = resolve(&TimeRange::preset(TimePreset::LastMonth), now()).unwrap();
        assert_eq!(r.start, at(2024, 2, 1, 0, 0, 0, 0));
        assert_eq!(r.end, at(2024, 2, 29, 23, 59, 59, 999));
    }

    #[test]
    fn last_quarter_covers_the_previous_calendar_quarter() {
        let r = resolve(&TimeRange::preset(TimePreset::LastQuarter), now()).unwrap();
        assert_eq!(r.start, at(2023, 10, 1, 0, 0, 0, 0));
        assert_eq!(r.end, at(2023, 12, 31, 23, 59, 59, 999));
    }

    #[test]
    fn all_time_starts_at_the_epoch() {
        let r = resolve(&TimeRange::preset(TimePreset::AllTime), now()).unwrap();
        assert_eq!(r.start, DateTime::UNIX_EPOCH);
        assert_eq!(r.end, at(2024, 3, 15, 23, 59, 59, 999));
    }

    #[test]
    fn custom_bounds_pass_through() {
        let start = at(2024, 1, 1, 0, 0, 0, 0);
        let end = at(2024, 1, 31, 12, 30, 0, 0);
        let r = resolve(&TimeRange::custom(start, end), now()).unwrap();
        assert_eq!(r.start, start);
        assert_eq!(r.end, end);
    }

    #[test]
    fn inverted_custom_bounds_are_rejected() {
        let start = at(2024, 2, 1, 0, 0, 0, 0);
        let end = at(2024, 1, 1, 0, 0, 0, 0);
        assert!(resolve(&TimeRange::custom(start, end), now()).is_err());
    }

    #[test]
    fn preset_renders_as_label() {
        assert_eq!(
            render_time_range(&TimeRange::preset(TimePreset::Last30Days)),
            "Last 30 Days"
        );
    }
}
