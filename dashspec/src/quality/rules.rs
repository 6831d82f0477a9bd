//! Row-level validation rules, applied after outlier handling.
//!
//! A rule marks the rows of one field that break its constraint, then
//! drops them, flags them in a `{field}_invalid_flag` column, or coerces
//! the offending cells to the rule's default (null when it has none).
//! Nulls only break `not_null`.

use super::DqLogEntry;
use crate::compiler::ValidationRulePlan;
use crate::dataset::{array_from_scalars, Column, Dataset};
use crate::error::Result;
use crate::spec::{ValidationAction, ValidationConstraint};
use arrow::array::{ArrayRef, BooleanArray};
use std::collections::HashMap;
use std::sync::Arc;

/// Suffix of the column added by the `flag` action.
pub const INVALID_FLAG_SUFFIX: &str = "_invalid_flag";

const STEP: &str = "validation";

pub(crate) fn apply(
    dataset: &Dataset,
    rule: &ValidationRulePlan,
    log: &mut Vec<DqLogEntry>,
) -> Result<Dataset> {
    let name = rule.field.name.as_str();
    let action = rule.action.as_str();
    let Some(column) = dataset.column(name) else {
        log.push(DqLogEntry::degraded(
            name,
            STEP,
            action,
            0,
            "column not in dataset, skipped",
        ));
        return Ok(dataset.clone());
    };
    let invalid = match violations(&column, rule) {
        Ok(invalid) => invalid,
        Err(reason) => {
            log.push(DqLogEntry::degraded(
                name,
                STEP,
                action,
                0,
                format!("{reason}, skipped"),
            ));
            return Ok(dataset.clone());
        }
    };
    let count = invalid.iter().filter(|i| **i).count();
    if count == 0 {
        return Ok(dataset.clone());
    }

    let (result, verb) = match rule.action {
        ValidationAction::Drop => {
            let keep: Vec<bool> = invalid.iter().map(|i| !i).collect();
            (dataset.filter_rows(&keep)?, "dropped")
        }
        ValidationAction::Flag => {
            let flag_name = format!("{name}{INVALID_FLAG_SUFFIX}");
            let mut flags = invalid;
            // a second rule on the same field adds to the existing flags
            if let Some(existing) = dataset.column(&flag_name) {
                for (row, flagged) in flags.iter_mut().enumerate() {
                    *flagged |= existing.key_at(row).as_deref() == Some("true");
                }
            }
            let flags: ArrayRef = Arc::new(BooleanArray::from(flags));
            (dataset.with_column(&flag_name, flags)?, "flagged")
        }
        ValidationAction::Coerce => {
            let mut values = column.scalars();
            for (value, _) in values.iter_mut().zip(&invalid).filter(|(_, i)| **i) {
                *value = rule.default.clone();
            }
            let array = array_from_scalars(column.field_type(), &values);
            (dataset.with_column(name, array)?, "coerced")
        }
    };

    log.push(DqLogEntry::applied(
        name,
        STEP,
        action,
        count,
        format!("{} constraint: {verb} {count} invalid value(s)", rule.constraint),
    ));
    Ok(result)
}

/// Per-row verdict: `true` where the row breaks the rule.
fn violations(
    column: &Column<'_>,
    rule: &ValidationRulePlan,
) -> std::result::Result<Vec<bool>, String> {
    let rows = column.len();
    match rule.constraint {
        ValidationConstraint::Range => {
            let values = column
                .numeric_values()
                .ok_or_else(|| format!("range needs a numeric field, got {}", column.field_type()))?;
            let min = rule.min.unwrap_or(f64::NEG_INFINITY);
            let max = rule.max.unwrap_or(f64::INFINITY);
            Ok(values
                .iter()
                .map(|v| v.is_some_and(|v| v < min || v > max))
                .collect())
        }
        ValidationConstraint::InSet => Ok((0..rows)
            .map(|row| {
                column
                    .scalar_at(row)
                    .is_some_and(|value| !rule.values.contains(&value))
            })
            .collect()),
        ValidationConstraint::NotNull => Ok((0..rows)
            .map(|row| column.is_null(row) || column.f64_at(row).is_some_and(f64::is_nan))
            .collect()),
        ValidationConstraint::Unique => {
            let keys: Vec<Option<String>> = (0..rows).map(|row| column.key_at(row)).collect();
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for key in keys.iter().flatten() {
                *counts.entry(key.as_str()).or_default() += 1;
            }
            Ok(keys
                .iter()
                .map(|key| {
                    key.as_deref()
                        .and_then(|key| counts.get(key))
                        .is_some_and(|count| *count > 1)
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FieldRef;
    use crate::execution::selection::Scalar;
    use crate::spec::FieldType;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            (
                "amount",
                Arc::new(Float64Array::from(vec![
                    Some(-5.0),
                    Some(20.0),
                    None,
                    Some(150.0),
                    Some(f64::NAN),
                ])) as ArrayRef,
            ),
            (
                "order_id",
                Arc::new(Int64Array::from(vec![1, 2, 2, 3, 4])) as ArrayRef,
            ),
            (
                "region",
                Arc::new(StringArray::from(vec![
                    Some("north"),
                    Some("mars"),
                    None,
                    Some("south"),
                    Some("north"),
                ])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    fn rule(
        name: &str,
        field_type: FieldType,
        constraint: ValidationConstraint,
        action: ValidationAction,
    ) -> ValidationRulePlan {
        ValidationRulePlan {
            field: FieldRef {
                name: name.to_string(),
                index: 0,
                field_type,
            },
            constraint,
            action,
            min: None,
            max: None,
            values: Vec::new(),
            default: None,
        }
    }

    fn flags(dataset: &Dataset, name: &str) -> Vec<Option<String>> {
        let column = dataset.column(name).unwrap();
        (0..column.len()).map(|row| column.key_at(row)).collect()
    }

    #[test]
    fn test_range_flags_values_outside_bounds() {
        let mut range = rule(
            "amount",
            FieldType::Float,
            ValidationConstraint::Range,
            ValidationAction::Flag,
        );
        range.min = Some(0.0);
        range.max = Some(100.0);
        let mut log = Vec::new();
        let out = apply(&dataset(), &range, &mut log).unwrap();

        let expected: Vec<Option<String>> = [true, false, false, true, false]
            .iter()
            .map(|f| Some(f.to_string()))
            .collect();
        assert_eq!(flags(&out, "amount_invalid_flag"), expected);
        assert_eq!(log[0].method, "validation");
        assert_eq!(log[0].action, "flag");
        assert_eq!(log[0].rows_affected, 2);
    }

    #[test]
    fn test_open_range_bound() {
        let mut at_least = rule(
            "amount",
            FieldType::Float,
            ValidationConstraint::Range,
            ValidationAction::Drop,
        );
        at_least.min = Some(0.0);
        let out = apply(&dataset(), &at_least, &mut Vec::new()).unwrap();
        assert_eq!(out.num_rows(), 4);
    }

    #[test]
    fn test_in_set_coerces_to_default() {
        let mut regions = rule(
            "region",
            FieldType::String,
            ValidationConstraint::InSet,
            ValidationAction::Coerce,
        );
        regions.values = vec![
            Scalar::Text("north".to_string()),
            Scalar::Text("south".to_string()),
        ];
        regions.default = Some(Scalar::Text("other".to_string()));
        let mut log = Vec::new();
        let out = apply(&dataset(), &regions, &mut log).unwrap();
        let region = out.column("region").unwrap();
        assert_eq!(region.scalar_at(1), Some(Scalar::Text("other".to_string())));
        // nulls are not checked by in_set
        assert_eq!(region.scalar_at(2), None);
        assert_eq!(log[0].rows_affected, 1);
    }

    #[test]
    fn test_not_null_drops_missing_and_nan() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &rule(
                "amount",
                FieldType::Float,
                ValidationConstraint::NotNull,
                ValidationAction::Drop,
            ),
            &mut log,
        )
        .unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(log[0].rows_affected, 2);
    }

    #[test]
    fn test_unique_marks_every_repeat() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &rule(
                "order_id",
                FieldType::Integer,
                ValidationConstraint::Unique,
                ValidationAction::Coerce,
            ),
            &mut log,
        )
        .unwrap();
        let ids = out.column("order_id").unwrap();
        assert_eq!(ids.f64_at(0), Some(1.0));
        assert_eq!(ids.f64_at(1), None);
        assert_eq!(ids.f64_at(2), None);
        assert_eq!(log[0].rows_affected, 2);
    }

    #[test]
    fn test_clean_field_is_not_logged() {
        let mut log = Vec::new();
        let out = apply(
            &dataset(),
            &rule(
                "region",
                FieldType::String,
                ValidationConstraint::Unique,
                ValidationAction::Flag,
            ),
            &mut log,
        )
        .unwrap();
        // "north" repeats
        assert_eq!(log.len(), 1);

        let mut log = Vec::new();
        let unchanged = apply(
            &out,
            &rule(
                "order_id",
                FieldType::Integer,
                ValidationConstraint::NotNull,
                ValidationAction::Flag,
            ),
            &mut log,
        )
        .unwrap();
        assert!(log.is_empty());
        assert_eq!(unchanged, out);
    }

    #[test]
    fn test_range_on_text_or_missing_column_degrades() {
        let mut log = Vec::new();
        let mut text_range = rule(
            "region",
            FieldType::String,
            ValidationConstraint::Range,
            ValidationAction::Drop,
        );
        text_range.max = Some(1.0);
        apply(&dataset(), &text_range, &mut log).unwrap();
        apply(
            &dataset(),
            &rule(
                "gone",
                FieldType::Float,
                ValidationConstraint::NotNull,
                ValidationAction::Drop,
            ),
            &mut log,
        )
        .unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|entry| entry.degraded));
        assert!(log[0].message.contains("numeric"));
    }
}
