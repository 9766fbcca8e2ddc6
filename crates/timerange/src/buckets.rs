use crate::resolver::ResolvedRange;
use chrono::{DateTime, Duration, Months, Utc};
use core_types::Granularity;

/// Subdivides a resolved range into consecutive sub-ranges, one per bucket.
///
/// Buckets step forward from the range start by one granularity unit; the
/// final bucket's end is clamped to the range's true end so a time series
/// never overruns into a period that has not occurred yet. The bucket count
/// equals the range duration divided by the step, rounded up.
pub fn bucket_ranges(range: &ResolvedRange, granularity: Granularity) -> Vec<ResolvedRange> {
    let mut buckets = Vec::new();
    let mut cursor = range.start;

    while cursor <= range.end {
        let next = advance(cursor, granularity);
        buckets.push(ResolvedRange {
            start: cursor,
            end: (next - Duration::milliseconds(1)).min(range.end),
        });
        cursor = next;
    }

    buckets
}

/// The boundary instants at which each bucket begins.
pub fn bucket_starts(range: &ResolvedRange, granularity: Granularity) -> Vec<DateTime<Utc>> {
    bucket_ranges(range, granularity)
        .into_iter()
        .map(|b| b.start)
        .collect()
}

/// Picks a readable default bucket size from the elapsed span. A chart
/// density heuristic, not a correctness rule; callers may override it.
pub fn default_granularity(range: &ResolvedRange) -> Granularity {
    match range.elapsed_days() {
        d if d <= 1 => Granularity::Hour,
        d if d <= 14 => Granularity::Day,
        d if d <= 90 => Granularity::Week,
        d if d <= 730 => Granularity::Month,
        d if d <= 1825 => Granularity::Quarter,
        _ => Granularity::Year,
    }
}

fn advance(instant: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Hour => instant + Duration::hours(1),
        Granularity::Day => instant + Duration::days(1),
        Granularity::Week => instant + Duration::days(7),
        Granularity::Month => add_months(instant, 1),
        Granularity::Quarter => add_months(instant, 3),
        Granularity::Year => add_months(instant, 12),
    }
}

fn add_months(instant: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    instant
        .checked_add_months(Months::new(months))
        .unwrap_or(instant + Duration::days(30 * i64::from(months)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use chrono::TimeZone;
    use core_types::{TimePreset, TimeRange};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn seven_day_range_yields_seven_daily_buckets() {
        let range = resolve(&TimeRange::preset(TimePreset::Last7Days), now()).unwrap();
        let buckets = bucket_ranges(&range, Granularity::Day);

        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].start, range.start);
        assert_eq!(buckets[6].end, range.end);
        // Consecutive buckets leave no gap.
        assert_eq!(
            buckets[1].start,
            buckets[0].end + Duration::milliseconds(1)
        );
    }

    #[test]
    fn final_bucket_is_clamped_to_the_true_end() {
        // 10 days bucketed weekly: one full week plus a 3-day remainder.
        let range = ResolvedRange {
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap(),
        };
        let buckets = bucket_ranges(&range, Granularity::Week);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].end, range.end);
        assert!(buckets[1].end - buckets[1].start < Duration::days(7));
    }

    #[test]
    fn single_day_yields_twenty_four_hourly_buckets() {
        let range = resolve(&TimeRange::preset(TimePreset::Today), now()).unwrap();
        let buckets = bucket_ranges(&range, Granularity::Hour);
        assert_eq!(buckets.len(), 24);
    }

    #[test]
    fn monthly_buckets_follow_calendar_months() {
        let range = ResolvedRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap(),
        };
        let starts = bucket_starts(&range, Granularity::Month);

        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1], Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(starts[2], Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn heuristic_tracks_elapsed_days() {
        let range = resolve(&TimeRange::preset(TimePreset::Today), now()).unwrap();
        assert_eq!(default_granularity(&range), Granularity::Hour);

        let range = resolve(&TimeRange::preset(TimePreset::Last7Days), now()).unwrap();
        assert_eq!(default_granularity(&range), Granularity::Day);

        let range = resolve(&TimeRange::preset(TimePreset::Last30Days), now()).unwrap();
        assert_eq!(default_granularity(&range), Granularity::Week);

        let range = resolve(&TimeRange::preset(TimePreset::Last365Days), now()).unwrap();
        assert_eq!(default_granularity(&range), Granularity::Month);

        let range = resolve(&TimeRange::preset(TimePreset::AllTime), now()).unwrap();
        assert_eq!(default_granularity(&range), Granularity::Year);
    }
}
