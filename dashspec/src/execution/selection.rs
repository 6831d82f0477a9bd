//! Typed filter selections and metric predicates.
//!
//! Raw spec values (`default`, sub-filter `value`) are converted here, once,
//! against the declared field type. The semantic validator runs the same
//! conversions so that the compiler never meets a value it cannot convert.

use crate::spec::{ComparisonOperator, FieldType, FilterKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Date format accepted in spec text and runtime selections.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
}

impl Scalar {
    /// Converts a raw value to a scalar of the given field type.
    pub fn from_value(field_type: FieldType, value: &Value) -> Result<Scalar, String> {
        let converted = match (field_type, value) {
            (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| Scalar::Int(f as i64)),
            },
            (FieldType::Float, Value::Number(n)) => n.as_f64().map(Scalar::Float),
            (FieldType::String, Value::String(s)) => Some(Scalar::Text(s.clone())),
            (FieldType::String, Value::Number(n)) => Some(Scalar::Text(n.to_string())),
            (FieldType::Boolean, Value::Bool(b)) => Some(Scalar::Bool(*b)),
            (FieldType::Date, Value::String(s)) => {
                NaiveDate::parse_from_str(s, DATE_FORMAT).ok().map(Scalar::Date)
            }
            _ => None,
        };
        converted.ok_or_else(|| format!("{value} is not a valid {field_type} value"))
    }

    /// Numeric view used for comparisons: dates compare by calendar order.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Date(d) => Some(crate::dataset::epoch_days(*d) as f64),
            Scalar::Text(_) | Scalar::Bool(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "{s}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

/// Active value of a page filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// No restriction.
    All,
    /// Inclusive numeric bounds (`range`, `slider`).
    Range { low: f64, high: f64 },
    /// Single value (`select`).
    Value(Scalar),
    /// Set membership (`multiselect`).
    Values(Vec<Scalar>),
    /// Inclusive date bounds (`date_range`).
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Selection {
    pub fn range(low: f64, high: f64) -> Self {
        Selection::Range { low, high }
    }

    pub fn date_range(start: NaiveDate, end: NaiveDate) -> Self {
        Selection::DateRange { start, end }
    }

    /// Converts a filter's declared default; an absent default selects everything.
    pub fn from_default(
        kind: FilterKind,
        field_type: FieldType,
        value: Option<&Value>,
    ) -> Result<Selection, String> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Selection::All),
            Some(value) => value,
        };

        match kind {
            FilterKind::Range | FilterKind::Slider => {
                let (low, high) = pair(value, |v| v.as_f64())
                    .ok_or_else(|| format!("{kind} default must be a pair of numbers [low, high]"))?;
                if low > high {
                    return Err(format!("{kind} default has low {low} above high {high}"));
                }
                Ok(Selection::Range { low, high })
            }
            FilterKind::DateRange => {
                let (start, end) = pair(value, |v| {
                    v.as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                })
                .ok_or_else(|| {
                    "date_range default must be a pair of YYYY-MM-DD dates [start, end]".to_string()
                })?;
                if start > end {
                    return Err(format!("date_range default starts {start} after it ends {end}"));
                }
                Ok(Selection::DateRange { start, end })
            }
            FilterKind::Select => {
                if value.is_array() || value.is_object() {
                    return Err("select default must be a single value".to_string());
                }
                Scalar::from_value(field_type, value).map(Selection::Value)
            }
            FilterKind::Multiselect => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| Scalar::from_value(field_type, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Selection::Values),
                Value::Object(_) => Err("multiselect default must be a list of values".to_string()),
                single => Scalar::from_value(field_type, single).map(|s| Selection::Values(vec![s])),
            },
        }
    }

    /// Whether this selection has the shape the filter kind expects.
    pub fn fits(&self, kind: FilterKind) -> bool {
        match self {
            Selection::All => true,
            Selection::Range { .. } => matches!(kind, FilterKind::Range | FilterKind::Slider),
            Selection::Value(_) => kind == FilterKind::Select,
            Selection::Values(_) => kind == FilterKind::Multiselect,
            Selection::DateRange { .. } => kind == FilterKind::DateRange,
        }
    }
}

fn pair<T>(value: &Value, convert: impl Fn(&Value) -> Option<T>) -> Option<(T, T)> {
    match value.as_array()?.as_slice() {
        [a, b] => Some((convert(a)?, convert(b)?)),
        _ => None,
    }
}

/// Right-hand side of a metric sub-filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    One(Scalar),
    Many(Vec<Scalar>),
}

/// Typed metric sub-filter: `field <operator> operand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub operator: ComparisonOperator,
    pub operand: Operand,
}

impl Predicate {
    /// Converts a raw sub-filter value against the field type.
    pub fn from_value(
        operator: ComparisonOperator,
        field_type: FieldType,
        value: &Value,
    ) -> Result<Predicate, String> {
        if operator.is_ordering() && !(field_type.is_numeric() || field_type == FieldType::Date) {
            return Err(format!(
                "operator '{operator}' needs an ordered field, but the field is {field_type}"
            ));
        }

        let operand = if operator.takes_list() {
            let items = value
                .as_array()
                .ok_or_else(|| format!("operator '{operator}' needs a list of values"))?;
            Operand::Many(
                items
                    .iter()
                    .map(|item| Scalar::from_value(field_type, item))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            if value.is_array() || value.is_object() {
                return Err(format!("operator '{operator}' needs a single value"));
            }
            Operand::One(Scalar::from_value(field_type, value)?)
        };

        Ok(Predicate { operator, operand })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_default_selects_all() {
        let selection = Selection::from_default(FilterKind::Range, FieldType::Float, None).unwrap();
        assert_eq!(selection, Selection::All);
    }

    #[test]
    fn test_range_default() {
        let selection =
            Selection::from_default(FilterKind::Range, FieldType::Float, Some(&json!([0, 100])))
                .unwrap();
        assert_eq!(selection, Selection::range(0.0, 100.0));

        assert!(
            Selection::from_default(FilterKind::Slider, FieldType::Float, Some(&json!([5, 1])))
                .is_err()
        );
        assert!(
            Selection::from_default(FilterKind::Range, FieldType::Float, Some(&json!(5))).is_err()
        );
    }

    #[test]
    fn test_date_range_default() {
        let selection = Selection::from_default(
            FilterKind::DateRange,
            FieldType::Date,
            Some(&json!(["2024-01-01", "2024-03-31"])),
        )
        .unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(selection, Selection::date_range(start, end));
        assert!(selection.fits(FilterKind::DateRange));
        assert!(!selection.fits(FilterKind::Range));
    }

    #[test]
    fn test_multiselect_accepts_single_value() {
        let selection = Selection::from_default(
            FilterKind::Multiselect,
            FieldType::String,
            Some(&json!("north")),
        )
        .unwrap();
        assert_eq!(
            selection,
            Selection::Values(vec![Scalar::Text("north".to_string())])
        );
    }

    #[test]
    fn test_select_default_must_match_type() {
        assert!(
            Selection::from_default(FilterKind::Select, FieldType::Boolean, Some(&json!("yes")))
                .is_err()
        );
        assert_eq!(
            Selection::from_default(FilterKind::Select, FieldType::Integer, Some(&json!(3.0)))
                .unwrap(),
            Selection::Value(Scalar::Int(3))
        );
    }

    #[test]
    fn test_predicate_conversion() {
        let p = Predicate::from_value(ComparisonOperator::In, FieldType::String, &json!(["a", "b"]))
            .unwrap();
        assert_eq!(
            p.operand,
            Operand::Many(vec![Scalar::Text("a".into()), Scalar::Text("b".into())])
        );

        assert!(Predicate::from_value(ComparisonOperator::Gt, FieldType::String, &json!("a")).is_err());
        assert!(Predicate::from_value(ComparisonOperator::In, FieldType::Integer, &json!(1)).is_err());
        assert!(Predicate::from_value(ComparisonOperator::Eq, FieldType::Integer, &json!([1])).is_err());
        assert!(Predicate::from_value(ComparisonOperator::Gte, FieldType::Date, &json!("2024-02-01")).is_ok());
    }
}
