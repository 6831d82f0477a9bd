//! Metric aggregations.

use crate::dataset::Column;
use crate::quality::stats;
use crate::spec::AggregationKind;
use std::collections::HashSet;

/// Value of an aggregation over zero rows.
///
/// Counts and sums are zero; every other aggregation is undefined.
pub fn empty_value(kind: AggregationKind) -> Option<f64> {
    match kind {
        AggregationKind::Count | AggregationKind::CountUnique | AggregationKind::Sum => Some(0.0),
        _ => None,
    }
}

/// Aggregates the non-null cells of a column. Numeric aggregations skip NaN
/// and infinities.
///
/// Numeric aggregations over a non-numeric column are undefined.
pub fn aggregate(kind: AggregationKind, column: &Column<'_>) -> Option<f64> {
    match kind {
        AggregationKind::Count => Some((column.len() - column.null_count()) as f64),
        AggregationKind::CountUnique => {
            let distinct: HashSet<String> =
                (0..column.len()).filter_map(|row| column.key_at(row)).collect();
            Some(distinct.len() as f64)
        }
        numeric => {
            let values: Vec<f64> = column.numeric_values()?.into_iter().flatten().collect();
            if values.is_empty() {
                return empty_value(numeric);
            }
            match numeric {
                AggregationKind::Sum => Some(values.iter().sum()),
                AggregationKind::Mean => stats::mean(&values),
                AggregationKind::Median => stats::median(&values),
                AggregationKind::Min => values.iter().copied().reduce(f64::min),
                AggregationKind::Max => values.iter().copied().reduce(f64::max),
                AggregationKind::Std => stats::sample_std(&values),
                AggregationKind::Count | AggregationKind::CountUnique => None,
            }
        }
    }
}

/// Rounds to `precision` fraction digits.
pub fn round_to(value: f64, precision: u8) -> f64 {
    let factor = 10f64.powi(i32::from(precision));
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
