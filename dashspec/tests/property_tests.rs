//! Property-based tests for the validation policy, the data quality engine
//! and metric execution.
//!
//! ## Test Categories
//!
//! ### 1. Validation
//! - Validating the same text twice yields the same outcome
//! - `relaxed` reports exactly the blocking subset of what `strict` reports
//! - A suppressed code never appears, whatever the spec
//!
//! ### 2. Data Quality
//! - Percentile capping keeps every row and lands inside the bounds
//! - Z-score on a constant column changes nothing
//!
//! ### 3. Execution
//! - Counts and sums over zero matching rows are zero, other aggregations undefined

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use dashspec::prelude::*;
use dashspec::quality::stats;
use dashspec::validation::codes;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Spec and Data Generation
// ============================================================================

/// Knobs of a generated one-page spec.
#[derive(Debug, Clone)]
struct SpecShape {
    metric_field: &'static str,
    aggregation: &'static str,
    with_filter_label: bool,
    precision: i64,
    chart_type: &'static str,
    duplicate_metric: bool,
}

fn spec_shape() -> impl Strategy<Value = SpecShape> {
    (
        prop::sample::select(vec!["amount", "transaction_id", "txn", "ghost"]),
        prop::sample::select(vec!["count", "sum", "mean", "median", "count_unique"]),
        any::<bool>(),
        -2i64..14,
        prop::sample::select(vec!["histogram", "scatter", "bar", "pie"]),
        any::<bool>(),
    )
        .prop_map(
            |(metric_field, aggregation, with_filter_label, precision, chart_type, duplicate_metric)| {
                SpecShape {
                    metric_field,
                    aggregation,
                    with_filter_label,
                    precision,
                    chart_type,
                    duplicate_metric,
                }
            },
        )
}

fn render(shape: &SpecShape) -> String {
    let label = if shape.with_filter_label {
        "          label: Amount\n"
    } else {
        ""
    };
    let duplicate = if shape.duplicate_metric {
        "        - id: m1\n          field: amount\n          aggregation: max\n"
    } else {
        ""
    };
    format!(
        r#"
dsl_version: "1.3.0"
dashboard:
  id: generated
  title: Generated
  data_source:
    type: csv
    path: data/generated.csv
    schema:
      transaction_id: integer
      amount: float
    formatting:
      amount:
        type: number
        precision: {precision}
  pages:
    - id: main
      title: Main
      filters:
        - id: amount_range
          field: amount
          type: range
{label}      metrics:
        - id: m1
          field: {field}
          aggregation: {aggregation}
{duplicate}      layout:
        type: single
        components:
          - type: visualization
            visualization:
              chart_type: {chart}
              roles:
                x: amount
"#,
        precision = shape.precision,
        field = shape.metric_field,
        aggregation = shape.aggregation,
        chart = shape.chart_type,
    )
}

/// A spec over a single float `value` column with the given outlier rule.
fn outlier_spec(method: &str, action: &str) -> String {
    format!(
        r#"
dsl_version: "1.3.0"
dashboard:
  id: outliers
  title: Outliers
  data_source:
    type: csv
    path: data/values.csv
    schema:
      value: float
    data_quality:
      outliers:
        rules:
          - fields: [value]
            method: {method}
            action: {action}
            lower: 5
            upper: 95
  pages:
    - id: main
      title: Main
      metrics:
        - id: total
          field: value
          aggregation: sum
          label: Total
      layout:
        type: single
        components:
          - type: metric_card
            metric_id: total
"#
    )
}

fn values_dataset(values: &[f64]) -> Dataset {
    Dataset::from_columns(vec![(
        "value",
        Arc::new(Float64Array::from(values.to_vec())) as ArrayRef,
    )])
    .unwrap()
}

fn page_values(result: &DashboardExecution) -> Vec<f64> {
    result.pages[0]
        .data
        .column("value")
        .unwrap()
        .numeric_values()
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

// ============================================================================
// Validation Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_validation_is_deterministic(shape in spec_shape()) {
        let text = render(&shape);
        let dashspec = DashSpec::new().with_policy(ValidationPolicy::strict());
        let first = dashspec.validate(&text, None).unwrap();
        let second = dashspec.validate(&text, None).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_relaxed_reports_blocking_subset_of_strict(shape in spec_shape()) {
        let text = render(&shape);
        let strict = DashSpec::new()
            .with_policy(ValidationPolicy::strict())
            .validate(&text, None)
            .unwrap();
        let relaxed = DashSpec::new()
            .with_policy(ValidationPolicy::relaxed())
            .validate(&text, None)
            .unwrap();

        let expected: Vec<Violation> = strict
            .violations
            .iter()
            .filter(|v| v.severity.is_blocking())
            .cloned()
            .collect();
        prop_assert_eq!(&relaxed.violations, &expected);
        prop_assert_eq!(relaxed.is_valid(), expected.is_empty());
        // strict never accepts more than relaxed
        prop_assert!(!strict.is_valid() || relaxed.is_valid());
    }

    #[test]
    fn prop_suppressed_codes_never_surface(shape in spec_shape()) {
        let text = render(&shape);
        let suppressed = [codes::UNKNOWN_FIELD, codes::MISSING_REQUIRED_ROLE, codes::MISSING_LABEL];
        let policy = suppressed
            .iter()
            .fold(ValidationPolicy::strict(), |policy, code| policy.suppress(*code));

        let outcome = DashSpec::new().with_policy(policy).validate(&text, None).unwrap();
        for violation in &outcome.violations {
            prop_assert!(!suppressed.contains(&violation.code.as_str()));
        }
    }
}

// ============================================================================
// Data Quality Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_percentile_cap_stays_within_bounds(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 2..120)
    ) {
        let result = DashSpec::new()
            .run(&outlier_spec("percentile", "cap"), &values_dataset(&values), &ExecutionInput::new())
            .unwrap();

        let lower = stats::quantile(&values, 0.05).unwrap();
        let upper = stats::quantile(&values, 0.95).unwrap();
        let capped = page_values(&result);

        prop_assert_eq!(result.row_count, values.len());
        prop_assert_eq!(capped.len(), values.len());
        for value in capped {
            prop_assert!(value >= lower && value <= upper, "{} outside [{}, {}]", value, lower, upper);
        }
    }

    #[test]
    fn prop_zscore_leaves_constant_field_unchanged(
        value in -1.0e6f64..1.0e6,
        rows in 2usize..60,
        action in prop::sample::select(vec!["cap", "remove", "flag"]),
    ) {
        let values = vec![value; rows];
        let result = DashSpec::new()
            .run(&outlier_spec("zscore", action), &values_dataset(&values), &ExecutionInput::new())
            .unwrap();

        prop_assert_eq!(result.row_count, rows);
        prop_assert_eq!(page_values(&result), values);
        prop_assert_eq!(result.dq_log.len(), 1);
        prop_assert!(result.dq_log[0].degraded);
        prop_assert_eq!(result.dq_log[0].rows_affected, 0);
    }
}

// ============================================================================
// Execution Properties
// ============================================================================

const EMPTY_MATCH_SPEC: &str = r#"
dsl_version: "1.3.0"
dashboard:
  id: empty
  title: Empty
  data_source:
    type: csv
    path: data/empty.csv
    schema:
      id: integer
      amount: float
  pages:
    - id: main
      title: Main
      filters:
        - {id: amount_range, field: amount, type: range, label: Amount}
      metrics:
        - {id: rows, field: id, aggregation: count, label: Rows}
        - {id: distinct, field: id, aggregation: count_unique, label: Distinct}
        - {id: total, field: amount, aggregation: sum, label: Total}
        - {id: average, field: amount, aggregation: mean, label: Average}
        - {id: spread, field: amount, aggregation: std, label: Spread}
      layout:
        type: single
        components:
          - {type: metric_card, metric_id: rows}
"#;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_aggregates_over_zero_rows(
        amounts in prop::collection::vec(0.0f64..1000.0, 0..40),
    ) {
        let ids: Vec<i64> = (0..amounts.len() as i64).collect();
        let dataset = Dataset::from_columns(vec![
            ("id", Arc::new(Int64Array::from(ids)) as ArrayRef),
            ("amount", Arc::new(Float64Array::from(amounts)) as ArrayRef),
        ])
        .unwrap();
        // no generated amount reaches the selected range
        let input = ExecutionInput::new().with_filter("amount_range", Selection::range(5000.0, 6000.0));

        let result = DashSpec::new().run(EMPTY_MATCH_SPEC, &dataset, &input).unwrap();
        let page = &result.pages[0];

        prop_assert_eq!(page.filtered_row_count, 0);
        for id in ["rows", "distinct", "total"] {
            prop_assert_eq!(page.metric(id).unwrap().raw_value, Some(0.0));
        }
        for id in ["average", "spread"] {
            prop_assert_eq!(page.metric(id).unwrap().raw_value, None);
            prop_assert_eq!(page.metric(id).unwrap().formatted_value.as_str(), "-");
        }
    }
}
