//! Integration tests for the full pipeline: data quality degradations,
//! multi-page dashboards, configuration and concurrent execution.

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use dashspec::config::DataQualityConfig;
use dashspec::prelude::*;
use dashspec::quality::OUTLIER_FLAG_SUFFIX;
use std::sync::Arc;

/// A one-page spec over `amount` (float) and `region` (string) with the
/// given `data_quality` block and metrics.
fn spec_with(data_quality: &str, metrics: &str) -> String {
    format!(
        r#"
dsl_version: "1.3.0"
dashboard:
  id: quality
  title: Quality
  data_source:
    type: csv
    path: data/quality.csv
    schema:
      amount: float
      score: float
      region: string
{data_quality}
  pages:
    - id: main
      title: Main
      metrics:
        - id: rows
          field: region
          aggregation: count
          label: Rows
{metrics}
      layout:
        type: single
        components:
          - type: metric_card
            metric_id: rows
"#
    )
}

fn dataset(amount: Vec<f64>) -> Dataset {
    let rows = amount.len();
    let regions: Vec<&str> = ["north", "south", "east", "west"]
        .iter()
        .cycle()
        .take(rows)
        .copied()
        .collect();
    let score: Vec<Option<f64>> = (0..rows).map(|i| Some(i as f64)).collect();
    Dataset::from_columns(vec![
        ("amount", Arc::new(Float64Array::from(amount)) as ArrayRef),
        ("score", Arc::new(Float64Array::from(score)) as ArrayRef),
        ("region", Arc::new(StringArray::from(regions)) as ArrayRef),
    ])
    .unwrap()
}

fn amounts(page: &dashspec::execution::PageExecution) -> Vec<Option<f64>> {
    page.data.column("amount").unwrap().numeric_values().unwrap()
}

#[test]
fn test_zscore_on_constant_field_leaves_it_unchanged() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: zscore
            action: cap"#,
        "",
    );
    let result = DashSpec::new()
        .run(&text, &dataset(vec![5.0; 6]), &ExecutionInput::new())
        .unwrap();

    assert_eq!(result.dq_log.len(), 1);
    let entry = &result.dq_log[0];
    assert!(entry.degraded);
    assert_eq!(entry.field, "amount");
    assert_eq!(entry.method, "zscore");
    assert_eq!(entry.rows_affected, 0);
    assert!(entry.message.contains("zero variance"));

    assert_eq!(amounts(&result.pages[0]), vec![Some(5.0); 6]);
}

#[test]
fn test_isolation_forest_falls_back_on_small_samples() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: isolation_forest
            action: flag"#,
        "",
    );
    let mut values: Vec<f64> = (1..=10).map(f64::from).collect();
    values.push(1000.0);

    let result = DashSpec::new()
        .run(&text, &dataset(values), &ExecutionInput::new())
        .unwrap();

    let entry = &result.dq_log[0];
    assert!(entry.degraded);
    assert_eq!(entry.method, "percentile");
    assert_eq!(entry.action, "flag");
    assert!(entry.message.starts_with("isolation_forest needs 256 values, got 11"));
    // 1.0 sits below the 1st percentile and 1000.0 above the 99th
    assert_eq!(entry.rows_affected, 2);

    let flag_column = format!("amount{OUTLIER_FLAG_SUFFIX}");
    let page = &result.pages[0];
    assert!(page.data.has_column(&flag_column));
    assert_eq!(page.filtered_row_count, 11);
}

#[test]
fn test_isolation_forest_is_reproducible_above_minimum() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: isolation_forest
            action: remove
            contamination: 0.1"#,
        "",
    );
    let mut values: Vec<f64> = (0..40).map(|i| 50.0 + f64::from(i % 7)).collect();
    values.push(5000.0);
    let data = dataset(values);

    let config = EngineConfig::default().with_data_quality(
        DataQualityConfig::default().with_isolation_forest_min_rows(20),
    );
    let dashspec = DashSpec::new().with_config(config);

    let first = dashspec.run(&text, &data, &ExecutionInput::new()).unwrap();
    let second = dashspec.run(&text, &data, &ExecutionInput::new()).unwrap();

    let entry = &first.dq_log[0];
    assert!(!entry.degraded);
    assert_eq!(entry.method, "isolation_forest");
    assert_eq!(first.dq_log, second.dq_log);
    assert_eq!(first.row_count, second.row_count);
    assert!(!amounts(&first.pages[0]).contains(&Some(5000.0)));
}

#[test]
fn test_auto_missing_drops_sparse_column() {
    let text = spec_with(
        r#"    data_quality:
      missing_values:
        strategy: auto
        fields: [score]
        max_missing_fraction: 0.5"#,
        r#"        - id: average_score
          field: score
          aggregation: mean
          label: Average score"#,
    );
    let data = Dataset::from_columns(vec![
        (
            "amount",
            Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0, 5.0])) as ArrayRef,
        ),
        (
            "score",
            Arc::new(Float64Array::from(vec![Some(1.0), None, None, None, Some(2.0)])) as ArrayRef,
        ),
        (
            "region",
            Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e"])) as ArrayRef,
        ),
    ])
    .unwrap();

    let result = DashSpec::new()
        .run(&text, &data, &ExecutionInput::new())
        .unwrap();

    let entry = &result.dq_log[0];
    assert!(entry.degraded);
    assert_eq!(entry.field, "score");
    assert_eq!(entry.action, "drop_column");
    assert!(entry.message.starts_with("60.0% missing"));

    let page = &result.pages[0];
    assert!(!page.data.has_column("score"));
    let average = page.metric("average_score").unwrap();
    assert_eq!(average.raw_value, None);
    assert_eq!(average.formatted_value, "-");
    assert_eq!(average.warnings, vec!["column 'score' not in dataset"]);
    assert_eq!(page.metric("rows").unwrap().raw_value, Some(5.0));
}

#[test]
fn test_auto_missing_fills_below_threshold() {
    let text = spec_with(
        r#"    data_quality:
      missing_values:
        strategy: auto
        fields: [score]"#,
        r#"        - id: average_score
          field: score
          aggregation: mean
          label: Average score"#,
    );
    let data = Dataset::from_columns(vec![
        (
            "amount",
            Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0])) as ArrayRef,
        ),
        (
            "score",
            Arc::new(Float64Array::from(vec![Some(2.0), None, Some(4.0), Some(6.0)])) as ArrayRef,
        ),
        (
            "region",
            Arc::new(StringArray::from(vec!["a", "b", "c", "d"])) as ArrayRef,
        ),
    ])
    .unwrap();

    let result = DashSpec::new()
        .run(&text, &data, &ExecutionInput::new())
        .unwrap();

    let entry = &result.dq_log[0];
    assert!(!entry.degraded);
    assert_eq!(entry.action, "fill_mean");
    assert_eq!(entry.rows_affected, 1);

    let score = result.pages[0].data.column("score").unwrap();
    assert_eq!(score.null_count(), 0);
    assert_eq!(
        result.pages[0].metric("average_score").unwrap().raw_value,
        Some(4.0)
    );
}

#[test]
fn test_validation_rules_run_after_outliers() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: percentile
            action: cap
            lower: 10
            upper: 90
      validation:
        rules:
          - field: amount
            constraint: range
            max: 50
            action: coerce
            default: 50
          - field: region
            constraint: in_set
            values: [north, south]
            action: drop"#,
        r#"        - id: total
          field: amount
          aggregation: sum
          label: Total"#,
    );
    let values: Vec<f64> = (0..=10).map(|i| f64::from(i) * 10.0).collect();
    let result = DashSpec::new()
        .run(&text, &dataset(values), &ExecutionInput::new())
        .unwrap();

    let log: Vec<(&str, &str, usize)> = result
        .dq_log
        .iter()
        .map(|e| (e.method.as_str(), e.action.as_str(), e.rows_affected))
        .collect();
    assert_eq!(
        log,
        vec![("percentile", "cap", 2), ("validation", "coerce", 5), ("validation", "drop", 5)]
    );
    let page = &result.pages[0];
    assert_eq!(page.filtered_row_count, 6);
    assert_eq!(page.metric("total").unwrap().raw_value, Some(210.0));
}

#[test]
fn test_validation_rule_on_unknown_field_is_rejected() {
    let text = spec_with(
        r#"    data_quality:
      validation:
        rules:
          - field: ghost
            constraint: not_null"#,
        "",
    );
    let outcome = DashSpec::new().validate(&text, None).unwrap();
    assert!(!outcome.is_valid());
    let violation = outcome
        .violations
        .iter()
        .find(|v| v.code == dashspec::validation::codes::DQ_FIELD_NOT_IN_SCHEMA)
        .unwrap();
    assert_eq!(
        violation.path,
        "/dashboard/data_source/data_quality/validation/rules/0"
    );
}

#[test]
fn test_non_finite_values_survive_isolation_forest() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: isolation_forest
            action: flag"#,
        r#"        - id: median_amount
          field: amount
          aggregation: median
          label: Median amount"#,
    );
    let mut values: Vec<f64> = (0..300).map(f64::from).collect();
    values[7] = f64::INFINITY;
    values[8] = f64::NAN;
    let result = DashSpec::new()
        .run(&text, &dataset(values), &ExecutionInput::new())
        .unwrap();

    let entry = &result.dq_log[0];
    assert_eq!(entry.method, "isolation_forest");
    assert!(!entry.degraded);
    let page = &result.pages[0];
    assert!(page.data.has_column(&format!("amount{OUTLIER_FLAG_SUFFIX}")));
    assert_eq!(page.metric("median_amount").unwrap().raw_value, Some(150.5));
}

#[test]
fn test_empty_dataset_degrades_to_sentinels() {
    let text = spec_with(
        r#"    data_quality:
      outliers:
        rules:
          - fields: [amount]
            method: iqr
            action: remove"#,
        r#"        - id: average_amount
          field: amount
          aggregation: mean
          label: Average amount"#,
    );
    let result = DashSpec::new()
        .run(&text, &dataset(Vec::new()), &ExecutionInput::new())
        .unwrap();

    assert_eq!(result.row_count, 0);
    assert_eq!(result.dq_log.len(), 1);
    assert_eq!(result.dq_log[0].field, "*");
    assert!(result.dq_log[0].degraded);

    let page = &result.pages[0];
    assert_eq!(page.metric("rows").unwrap().raw_value, Some(0.0));
    assert_eq!(page.metric("rows").unwrap().formatted_value, "0");
    assert_eq!(page.metric("average_amount").unwrap().raw_value, None);
    assert_eq!(page.metric("average_amount").unwrap().formatted_value, "-");
}

const MULTI_PAGE_SPEC: &str = r#"
dsl_version: "1.3.0"
dashboard:
  id: regions
  title: Regions
  data_source:
    type: csv
    path: data/regions.csv
    schema:
      order_id: integer
      amount: float
      region: string
  pages:
    - id: all
      title: All regions
      metrics:
        - id: orders
          field: order_id
          aggregation: count
          label: Orders
      layout:
        type: single
        components:
          - type: metric_card
            metric_id: orders
    - id: by_region
      title: One region
      filters:
        - id: region
          field: region
          type: select
          label: Region
          default: north
      metrics:
        - id: orders
          field: order_id
          aggregation: count
          label: Orders
        - id: largest
          field: amount
          aggregation: max
          label: Largest order
      layout:
        type: tabs
        components:
          - type: metric_card
            metric_id: orders
          - type: visualization
            visualization:
              chart_type: bar
              roles:
                x: region
                y: amount
"#;

fn orders() -> Dataset {
    Dataset::from_columns(vec![
        (
            "order_id",
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5, 6])) as ArrayRef,
        ),
        (
            "amount",
            Arc::new(Float64Array::from(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0])) as ArrayRef,
        ),
        (
            "region",
            Arc::new(StringArray::from(vec![
                "north", "south", "north", "east", "north", "south",
            ])) as ArrayRef,
        ),
    ])
    .unwrap()
}

#[test]
fn test_pages_filter_independently() {
    let result = DashSpec::new()
        .run(MULTI_PAGE_SPEC, &orders(), &ExecutionInput::new())
        .unwrap();

    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.page("all").unwrap().filtered_row_count, 6);
    assert_eq!(
        result.page("all").unwrap().metric("orders").unwrap().raw_value,
        Some(6.0)
    );

    let by_region = result.page("by_region").unwrap();
    assert_eq!(by_region.filtered_row_count, 3);
    assert_eq!(by_region.metric("largest").unwrap().raw_value, Some(50.0));
}

#[test]
fn test_mismatched_selection_falls_back_to_default() {
    let input = ExecutionInput::new().with_filter("region", Selection::range(0.0, 1.0));
    let result = DashSpec::new()
        .run(MULTI_PAGE_SPEC, &orders(), &input)
        .unwrap();

    let by_region = result.page("by_region").unwrap();
    assert_eq!(by_region.filtered_row_count, 3);
    assert_eq!(by_region.warnings.len(), 1);
    assert!(by_region.warnings[0].contains("default used"));
}

#[test]
fn test_plan_is_shared_across_threads() {
    let dashspec = DashSpec::new();
    let data = orders();
    let plan = dashspec
        .compile(MULTI_PAGE_SPEC, Some(&data.inferred_catalog()))
        .unwrap();
    let engine = dashspec.engine();

    let regions = ["north", "south", "east", "west"];
    let sequential: Vec<Option<f64>> = regions
        .iter()
        .map(|region| {
            let input = ExecutionInput::new()
                .with_filter("region", Selection::Value(Scalar::Text(region.to_string())));
            let page = engine.execute_page(&plan, "by_region", &data, &input).unwrap();
            page.metric("orders").unwrap().raw_value
        })
        .collect();
    assert_eq!(sequential, vec![Some(3.0), Some(2.0), Some(1.0), Some(0.0)]);

    let concurrent: Vec<Option<f64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = regions
            .iter()
            .map(|region| {
                let plan = &plan;
                let data = &data;
                scope.spawn(move || {
                    let input = ExecutionInput::new().with_filter(
                        "region",
                        Selection::Value(Scalar::Text(region.to_string())),
                    );
                    let page = engine.execute_page(plan, "by_region", data, &input).unwrap();
                    page.metric("orders").unwrap().raw_value
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(concurrent, sequential);
}

#[test]
fn test_engine_config_from_yaml() {
    let config = EngineConfig::from_yaml(
        r#"
formatting:
  undefined_display: "n/a"
data_quality:
  random_seed: 7
"#,
    )
    .unwrap();
    assert_eq!(config.data_quality.random_seed, 7);
    assert_eq!(config.data_quality.isolation_forest_min_rows, 256);

    let text = spec_with(
        "",
        r#"        - id: average_amount
          field: amount
          aggregation: mean
          label: Average amount"#,
    );
    let result = DashSpec::new()
        .with_config(config)
        .run(&text, &dataset(Vec::new()), &ExecutionInput::new())
        .unwrap();
    assert_eq!(
        result.pages[0].metric("average_amount").unwrap().formatted_value,
        "n/a"
    );

    let err = EngineConfig::from_yaml("data_quality:\n  auto_missing_threshold: 2.0\n").unwrap_err();
    assert!(matches!(err, DashSpecError::Configuration(_)));
}
