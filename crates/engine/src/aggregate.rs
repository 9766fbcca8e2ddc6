//! Pure numeric reducers over in-memory value lists.
//!
//! Null cells reach this module as `None`: `sum` coerces them to 0, `average`
//! excludes them from the denominator entirely. Empty inputs reduce to 0
//! rather than erroring, matching the engine's degrade-gracefully policy.

use std::collections::BTreeSet;

/// The reducers the engine supports over a fetched column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    CountDistinct,
    Sum,
    Average,
    Min,
    Max,
}

/// Applies a reducer to a fetched column. Never panics, never divides by
/// zero; every reducer yields 0 on an empty input.
pub fn aggregate(aggregation: Aggregation, values: &[Option<f64>]) -> f64 {
    match aggregation {
        Aggregation::Count => values.len() as f64,
        Aggregation::CountDistinct => {
            let distinct: BTreeSet<u64> = values
                .iter()
                .filter_map(|v| v.map(f64::to_bits))
                .collect();
            distinct.len() as f64
        }
        Aggregation::Sum => values.iter().map(|v| v.unwrap_or(0.0)).sum(),
        Aggregation::Average => {
            let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            if present.is_empty() {
                0.0
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            }
        }
        Aggregation::Min => values
            .iter()
            .filter_map(|v| *v)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
            .unwrap_or(0.0),
        Aggregation::Max => values
            .iter()
            .filter_map(|v| *v)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
            .unwrap_or(0.0),
    }
}

/// Zero-safe division: 0 when the denominator is 0, never NaN or infinity.
/// `percentage` multiplies the quotient by 100.
pub fn safe_ratio(numerator: f64, denominator: f64, percentage: bool) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if percentage { ratio * 100.0 } else { ratio }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_reduce_to_zero() {
        assert_eq!(aggregate(Aggregation::Sum, &[]), 0.0);
        assert_eq!(aggregate(Aggregation::Average, &[]), 0.0);
        assert_eq!(aggregate(Aggregation::Min, &[]), 0.0);
        assert_eq!(aggregate(Aggregation::Max, &[]), 0.0);
    }

    #[test]
    fn sum_coerces_nulls_to_zero() {
        assert_eq!(aggregate(Aggregation::Sum, &[Some(2.0), None, Some(3.0)]), 5.0);
    }

    #[test]
    fn average_excludes_nulls_from_the_denominator() {
        assert_eq!(
            aggregate(Aggregation::Average, &[Some(2.0), None, Some(4.0)]),
            3.0
        );
        // All nulls behaves like an empty set.
        assert_eq!(aggregate(Aggregation::Average, &[None, None]), 0.0);
    }

    #[test]
    fn count_distinct_ignores_nulls() {
        assert_eq!(
            aggregate(
                Aggregation::CountDistinct,
                &[Some(1.0), Some(1.0), None, Some(2.0)]
            ),
            2.0
        );
    }

    #[test]
    fn min_and_max_skip_nulls() {
        let values = [None, Some(4.0), Some(-1.0), None, Some(2.5)];
        assert_eq!(aggregate(Aggregation::Min, &values), -1.0);
        assert_eq!(aggregate(Aggregation::Max, &values), 4.0);
    }

    #[test]
    fn safe_ratio_never_produces_nan_or_infinity() {
        assert_eq!(safe_ratio(10.0, 0.0, false), 0.0);
        assert_eq!(safe_ratio(10.0, 0.0, true), 0.0);
        assert_eq!(safe_ratio(0.0, 0.0, true), 0.0);
        assert_eq!(safe_ratio(1.0, 4.0, false), 0.25);
        assert_eq!(safe_ratio(1.0, 4.0, true), 25.0);
    }
}
