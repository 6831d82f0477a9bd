//! Row masks for filter selections and metric predicates.
//!
//! Null cells never match, except under [`Selection::All`].

use super::selection::{Operand, Predicate, Scalar, Selection};
use crate::dataset::{epoch_days, Column};
use crate::spec::ComparisonOperator;
use arrow::array::BooleanArray;
use std::cmp::Ordering;

/// Orders a cell against a scalar; `None` for nulls and incomparable types.
pub fn compare(column: &Column<'_>, row: usize, scalar: &Scalar) -> Option<Ordering> {
    if column.is_null(row) {
        return None;
    }
    match (column, scalar) {
        (Column::Text(array), Scalar::Text(text)) => Some(array.value(row).cmp(text.as_str())),
        (Column::Bool(array), Scalar::Bool(flag)) => Some(array.value(row).cmp(flag)),
        (Column::Text(_) | Column::Bool(_), _) => None,
        _ => column.f64_at(row)?.partial_cmp(&scalar.as_f64()?),
    }
}

fn matches_any(column: &Column<'_>, row: usize, values: &[Scalar]) -> bool {
    values
        .iter()
        .any(|value| compare(column, row, value) == Some(Ordering::Equal))
}

fn mask(column: &Column<'_>, keep: impl Fn(usize) -> bool) -> BooleanArray {
    BooleanArray::from((0..column.len()).map(keep).collect::<Vec<bool>>())
}

/// Rows of `column` that a page filter selection keeps.
pub fn selection_mask(column: &Column<'_>, selection: &Selection) -> BooleanArray {
    match selection {
        Selection::All => mask(column, |_| true),
        Selection::Range { low, high } => mask(column, |row| {
            column
                .f64_at(row)
                .map(|v| *low <= v && v <= *high)
                .unwrap_or(false)
        }),
        Selection::Value(value) => mask(column, |row| {
            compare(column, row, value) == Some(Ordering::Equal)
        }),
        Selection::Values(values) => mask(column, |row| matches_any(column, row, values)),
        Selection::DateRange { start, end } => {
            let (start, end) = (f64::from(epoch_days(*start)), f64::from(epoch_days(*end)));
            mask(column, |row| match column {
                Column::Date(_) => column
                    .f64_at(row)
                    .map(|days| start <= days && days <= end)
                    .unwrap_or(false),
                _ => false,
            })
        }
    }
}

/// Rows of `column` that satisfy a metric sub-filter.
pub fn predicate_mask(column: &Column<'_>, predicate: &Predicate) -> BooleanArray {
    match (&predicate.operand, predicate.operator) {
        (Operand::Many(values), ComparisonOperator::In) => {
            mask(column, |row| matches_any(column, row, values))
        }
        (Operand::Many(values), ComparisonOperator::NotIn) => mask(column, |row| {
            !column.is_null(row) && !matches_any(column, row, values)
        }),
        (Operand::One(value), operator) => mask(column, |row| {
            let Some(ordering) = compare(column, row, value) else {
                return false;
            };
            match operator {
                ComparisonOperator::Eq | ComparisonOperator::In => ordering == Ordering::Equal,
                ComparisonOperator::Ne | ComparisonOperator::NotIn => ordering != Ordering::Equal,
                ComparisonOperator::Gt => ordering == Ordering::Greater,
                ComparisonOperator::Gte => ordering != Ordering::Less,
                ComparisonOperator::Lt => ordering == Ordering::Less,
                ComparisonOperator::Lte => ordering != Ordering::Greater,
            }
        }),
        // list operand with a scalar operator: treat as membership
        (Operand::Many(values), _) => mask(column, |row| matches_any(column, row, values)),
    }
}
