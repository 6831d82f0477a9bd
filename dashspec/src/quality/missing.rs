//! Missing value handling.

use super::{stats, DqLogEntry};
use crate::compiler::MissingPlan;
use crate::dataset::{array_from_scalars, Column, Dataset};
use crate::error::Result;
use crate::execution::selection::Scalar;
use crate::spec::{FieldType, MissingValueStrategy};
use arrow::array::{ArrayRef, BooleanArray};
use serde_json::Value;
use std::sync::Arc;

/// Fill used by `fill_mode` on string fields without any value.
pub const UNKNOWN_SENTINEL: &str = "Unknown";

/// Suffix of the column added by the `flag` strategy.
pub const MISSING_FLAG_SUFFIX: &str = "_missing_flag";

const STEP: &str = "missing_values";

/// Strategy `auto` settles on for a field.
///
/// Above `max_fraction` missing the column is dropped; otherwise numeric
/// fields get the mean, categorical fields the mode and dates the previous
/// value.
pub fn resolve_auto(
    field_type: FieldType,
    missing_fraction: f64,
    max_fraction: f64,
) -> MissingValueStrategy {
    if missing_fraction > max_fraction {
        return MissingValueStrategy::DropColumn;
    }
    match field_type {
        FieldType::Integer | FieldType::Float => MissingValueStrategy::FillMean,
        FieldType::String | FieldType::Boolean => MissingValueStrategy::FillMode,
        FieldType::Date => MissingValueStrategy::FillForward,
    }
}

pub(crate) fn apply(
    dataset: &Dataset,
    plan: &MissingPlan,
    log: &mut Vec<DqLogEntry>,
) -> Result<Dataset> {
    let rows = dataset.num_rows();
    let mut current = dataset.clone();
    let mut keep = vec![true; rows];
    let mut drop_fields = Vec::new();

    for field in &plan.fields {
        let name = field.name.as_str();
        let Some(column) = current.column(name) else {
            log.push(DqLogEntry::degraded(
                name,
                STEP,
                plan.strategy.as_str(),
                0,
                "column not in dataset, skipped",
            ));
            continue;
        };
        let missing = column.null_count();
        if missing == 0 {
            continue;
        }

        let fraction = missing as f64 / rows as f64;
        let strategy = match plan.strategy {
            MissingValueStrategy::Auto => {
                resolve_auto(column.field_type(), fraction, plan.max_missing_fraction)
            }
            explicit => explicit,
        };

        match strategy {
            MissingValueStrategy::DropRows => {
                for (row, kept) in keep.iter_mut().enumerate() {
                    if column.is_null(row) {
                        *kept = false;
                    }
                }
                drop_fields.push(name.to_string());
            }
            MissingValueStrategy::DropColumn => {
                let message = format!("{:.1}% missing, column dropped", fraction * 100.0);
                current = current.without_column(name)?;
                let entry = if plan.strategy == MissingValueStrategy::Auto {
                    DqLogEntry::degraded(name, STEP, strategy.as_str(), rows, message)
                } else {
                    DqLogEntry::applied(name, STEP, strategy.as_str(), rows, message)
                };
                log.push(entry);
            }
            MissingValueStrategy::Flag => {
                let flags: Vec<bool> = (0..rows).map(|row| column.is_null(row)).collect();
                let flags: ArrayRef = Arc::new(BooleanArray::from(flags));
                current = current.with_column(&format!("{name}{MISSING_FLAG_SUFFIX}"), flags)?;
                log.push(DqLogEntry::applied(
                    name,
                    STEP,
                    strategy.as_str(),
                    missing,
                    format!("flagged {missing} missing values"),
                ));
            }
            fill_strategy => match fill(&column, fill_strategy, plan.fill_value.as_ref()) {
                Ok((array, filled)) => {
                    current = current.with_column(name, array)?;
                    log.push(DqLogEntry::applied(
                        name,
                        STEP,
                        fill_strategy.as_str(),
                        filled,
                        format!("filled {filled} of {missing} missing values"),
                    ));
                }
                Err(reason) => log.push(DqLogEntry::degraded(
                    name,
                    STEP,
                    fill_strategy.as_str(),
                    0,
                    format!("{reason}, missing values left in place"),
                )),
            },
        }
    }

    if !drop_fields.is_empty() {
        let dropped = keep.iter().filter(|kept| !**kept).count();
        current = current.filter_rows(&keep)?;
        log.push(DqLogEntry::applied(
            drop_fields.join(","),
            STEP,
            MissingValueStrategy::DropRows.as_str(),
            dropped,
            format!("dropped {dropped} of {rows} rows"),
        ));
    }

    Ok(current)
}

/// Fills the nulls of a column; returns the new array and how many nulls were filled.
fn fill(
    column: &Column<'_>,
    strategy: MissingValueStrategy,
    fill_value: Option<&Value>,
) -> std::result::Result<(ArrayRef, usize), String> {
    let field_type = column.field_type();
    let mut values = column.scalars();
    let missing = values.iter().filter(|v| v.is_none()).count();

    match strategy {
        MissingValueStrategy::FillMean | MissingValueStrategy::FillMedian => {
            let present: Vec<f64> = column
                .numeric_values()
                .ok_or_else(|| format!("{} needs a numeric field, got {field_type}", strategy))?
                .into_iter()
                .flatten()
                .collect();
            let statistic = if strategy == MissingValueStrategy::FillMean {
                stats::mean(&present)
            } else {
                stats::median(&present)
            }
            .ok_or_else(|| "no values to compute a fill from".to_string())?;
            let scalar = match field_type {
                FieldType::Integer => Scalar::Int(statistic.round() as i64),
                _ => Scalar::Float(statistic),
            };
            fill_nulls(&mut values, &scalar);
        }
        MissingValueStrategy::FillMode => {
            let keys: Vec<Option<String>> = (0..column.len()).map(|row| column.key_at(row)).collect();
            let mode = stats::mode(keys.iter().flatten().map(String::as_str));
            let scalar = match mode {
                Some(mode) => keys
                    .iter()
                    .position(|key| key.as_deref() == Some(mode.as_str()))
                    .and_then(|row| column.scalar_at(row)),
                None if field_type == FieldType::String => {
                    Some(Scalar::Text(UNKNOWN_SENTINEL.to_string()))
                }
                None => None,
            }
            .ok_or_else(|| "no values to take a mode from".to_string())?;
            fill_nulls(&mut values, &scalar);
        }
        MissingValueStrategy::Interpolate => {
            let numeric = column
                .numeric_values()
                .ok_or_else(|| format!("{strategy} needs a numeric field, got {field_type}"))?;
            for (value, line) in values.iter_mut().zip(interpolate(&numeric)) {
                if value.is_none() {
                    *value = line.map(|v| match field_type {
                        FieldType::Integer => Scalar::Int(v.round() as i64),
                        _ => Scalar::Float(v),
                    });
                }
            }
        }
        MissingValueStrategy::FillForward => carry(values.iter_mut()),
        MissingValueStrategy::FillBackward => carry(values.iter_mut().rev()),
        MissingValueStrategy::FillValue => {
            let raw = fill_value
                .ok_or_else(|| "fill_value strategy without a fill_value".to_string())?;
            let scalar = Scalar::from_value(field_type, raw)?;
            fill_nulls(&mut values, &scalar);
        }
        other => return Err(format!("{other} is not a fill strategy")),
    }

    let remaining = values.iter().filter(|v| v.is_none()).count();
    Ok((array_from_scalars(field_type, &values), missing - remaining))
}

fn fill_nulls(values: &mut [Option<Scalar>], scalar: &Scalar) {
    for value in values.iter_mut().filter(|v| v.is_none()) {
        *value = Some(scalar.clone());
    }
}

/// Linear interpolation across interior gaps; leading and trailing gaps stay.
fn interpolate(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut line = values.to_vec();
    let mut previous: Option<(usize, f64)> = None;
    for (row, value) in values.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        if let Some((start, from)) = previous {
            let span = (row - start) as f64;
            for (gap, slot) in line.iter_mut().enumerate().take(row).skip(start + 1) {
                *slot = Some(from + (value - from) * (gap - start) as f64 / span);
            }
        }
        previous = Some((row, value));
    }
    line
}

/// Carries the last seen value over nulls, in iteration order.
fn carry<'a>(values: impl Iterator<Item = &'a mut Option<Scalar>>) {
    let mut last: Option<Scalar> = None;
    for value in values {
        if value.is_none() {
            *value = last.clone();
        } else {
            last = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FieldRef;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use serde_json::json;
    use std::sync::Arc;

    fn field(name: &str, index: usize, field_type: FieldType) -> FieldRef {
        FieldRef {
            name: name.to_string(),
            index,
            field_type,
        }
    }

    fn plan(strategy: MissingValueStrategy, fields: Vec<FieldRef>) -> MissingPlan {
        MissingPlan {
            strategy,
            fill_value: None,
            fields,
            max_missing_fraction: 0.5,
        }
    }

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            (
                "amount",
                Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0), Some(8.0)]))
                    as ArrayRef,
            ),
            (
                "qty",
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None, None])) as ArrayRef,
            ),
            (
                "region",
                Arc::new(StringArray::from(vec![None, Some("north"), Some("south"), Some("north")]))
                    as ArrayRef,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_fill_mean_and_median() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::FillMean, vec![field("amount", 0, FieldType::Float)]),
            &mut log,
        )
        .unwrap();
        assert_eq!(out.column("amount").unwrap().f64_at(1), Some(4.0));
        assert_eq!(log[0].rows_affected, 1);

        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::FillMedian, vec![field("amount", 0, FieldType::Float)]),
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(out.column("amount").unwrap().f64_at(1), Some(3.0));
    }

    #[test]
    fn test_fill_mode_and_unknown_sentinel() {
        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::FillMode, vec![field("region", 2, FieldType::String)]),
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(
            out.column("region").unwrap().scalar_at(0),
            Some(Scalar::Text("north".to_string()))
        );

        let empty = Dataset::from_columns(vec![(
            "region",
            Arc::new(StringArray::from(vec![None::<&str>, None])) as ArrayRef,
        )])
        .unwrap();
        let out = apply(
            &empty,
            &plan(MissingValueStrategy::FillMode, vec![field("region", 0, FieldType::String)]),
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(
            out.column("region").unwrap().scalar_at(1),
            Some(Scalar::Text(UNKNOWN_SENTINEL.to_string()))
        );
    }

    #[test]
    fn test_drop_rows_covers_every_field() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &plan(
                MissingValueStrategy::DropRows,
                vec![field("amount", 0, FieldType::Float), field("qty", 1, FieldType::Integer)],
            ),
            &mut log,
        )
        .unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].rows_affected, 3);
    }

    #[test]
    fn test_auto_drops_mostly_missing_column() {
        let mut strict = plan(
            MissingValueStrategy::Auto,
            vec![field("qty", 1, FieldType::Integer), field("amount", 0, FieldType::Float)],
        );
        strict.max_missing_fraction = 0.3;
        let mut log = Vec::new();
        let out = apply(&dataset(), &strict, &mut log).unwrap();
        assert!(!out.has_column("qty"));
        assert!(log[0].degraded);
        // 25% missing stays under the threshold and is mean-filled
        assert_eq!(out.column("amount").unwrap().null_count(), 0);
        assert_eq!(log[1].action, "fill_mean");
    }

    #[test]
    fn test_forward_and_backward_fill() {
        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::FillForward, vec![field("qty", 1, FieldType::Integer)]),
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(out.column("qty").unwrap().f64_at(3), Some(2.0));

        let mut log = Vec::new();
        apply(
            &dataset(),
            &plan(MissingValueStrategy::FillBackward, vec![field("qty", 1, FieldType::Integer)]),
            &mut log,
        )
        .unwrap();
        // trailing nulls have nothing to carry back
        assert_eq!(log[0].rows_affected, 0);
    }

    #[test]
    fn test_fill_value_is_typed_per_field() {
        let mut with_value = plan(
            MissingValueStrategy::FillValue,
            vec![field("qty", 1, FieldType::Integer), field("region", 2, FieldType::String)],
        );
        with_value.fill_value = Some(json!(0));
        let out = apply(&dataset(), &with_value, &mut Vec::new()).unwrap();
        assert_eq!(out.column("qty").unwrap().f64_at(2), Some(0.0));
        assert_eq!(
            out.column("region").unwrap().scalar_at(0),
            Some(Scalar::Text("0".to_string()))
        );
    }

    #[test]
    fn test_missing_column_is_logged() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::FillMean, vec![field("gone", 5, FieldType::Float)]),
            &mut log,
        )
        .unwrap();
        assert_eq!(out, dataset());
        assert!(log[0].degraded);
    }

    #[test]
    fn test_interpolate_fills_interior_gaps() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &plan(
                MissingValueStrategy::Interpolate,
                vec![field("amount", 0, FieldType::Float), field("qty", 1, FieldType::Integer)],
            ),
            &mut log,
        )
        .unwrap();
        assert_eq!(out.column("amount").unwrap().f64_at(1), Some(2.0));
        // trailing gaps have no right neighbour
        assert_eq!(out.column("qty").unwrap().null_count(), 2);
        assert_eq!(log[1].rows_affected, 0);

        let ramp = Dataset::from_columns(vec![(
            "qty",
            Arc::new(Int64Array::from(vec![None, Some(1), None, None, Some(4)])) as ArrayRef,
        )])
        .unwrap();
        let out = apply(
            &ramp,
            &plan(MissingValueStrategy::Interpolate, vec![field("qty", 0, FieldType::Integer)]),
            &mut Vec::new(),
        )
        .unwrap();
        let qty = out.column("qty").unwrap();
        let filled: Vec<Option<i64>> = qty
            .scalars()
            .into_iter()
            .map(|v| match v {
                Some(Scalar::Int(i)) => Some(i),
                _ => None,
            })
            .collect();
        assert_eq!(filled, vec![None, Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_interpolate_skips_text_fields() {
        let mut log = Vec::new();
        apply(
            &dataset(),
            &plan(MissingValueStrategy::Interpolate, vec![field("region", 2, FieldType::String)]),
            &mut log,
        )
        .unwrap();
        assert!(log[0].degraded);
        assert!(log[0].message.contains("numeric"));
    }

    #[test]
    fn test_flag_marks_missing_without_filling() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &plan(MissingValueStrategy::Flag, vec![field("region", 2, FieldType::String)]),
            &mut log,
        )
        .unwrap();
        let flags = out.column("region_missing_flag").unwrap();
        assert_eq!(flags.key_at(0).as_deref(), Some("true"));
        assert_eq!(flags.key_at(1).as_deref(), Some("false"));
        assert_eq!(out.column("region").unwrap().null_count(), 1);
        assert_eq!(log[0].action, "flag");
        assert_eq!(log[0].rows_affected, 1);
    }
}
