//! Canned specs and datasets for tests.
//!
//! Two scenarios are provided:
//!
//! - *Scenario A*: a single-page transactions dashboard with a `range`
//!   filter on `amount` (default `[0, 100]`) and a `count` metric over
//!   `transaction_id`, paired with a five-row dataset.
//! - *Sales*: a richer dashboard exercising formatting, metric sub-filters,
//!   data quality rules and most component kinds.

#![allow(clippy::expect_used)]

use crate::catalog::FieldCatalog;
use crate::dataset::{epoch_days, Dataset};
use crate::spec::FieldType;
use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use chrono::NaiveDate;
use std::sync::Arc;

/// Transactions dashboard: one page, one range filter, two metrics.
pub const SCENARIO_A_SPEC: &str = r#"
dsl_version: "1.3.0"
dashboard:
  id: transactions
  title: Transactions
  data_source:
    type: csv
    path: data/transactions.csv
    schema:
      transaction_id: integer
      amount: float
  pages:
    - id: overview
      title: Overview
      filters:
        - id: amount_range
          field: amount
          type: range
          label: Amount
          default: [0, 100]
      metrics:
        - id: transaction_count
          field: transaction_id
          aggregation: count
          label: Transactions
        - id: average_amount
          field: amount
          aggregation: mean
          label: Average amount
      layout:
        type: grid
        components:
          - type: visualization
            id: amount_hist
            title: Amount distribution
            width: two-thirds
            visualization:
              chart_type: histogram
              roles:
                x: amount
              params:
                bins: 20
          - type: metric_card
            id: count_card
            width: third
            metric_id: transaction_count
"#;

/// Sales dashboard with formatting, sub-filtered metrics and data quality rules.
pub const SALES_SPEC: &str = r#"
dsl_version: "1.3.0"
dashboard:
  id: sales
  title: Sales Performance
  description: Orders by region and month
  metadata:
    dataset_name: Orders
    source: ERP export
    row_count: 8
    currency: USD
  data_source:
    type: parquet
    path: data/orders.parquet
    schema:
      amount: float
      quantity: integer
      region: string
      order_month: integer
      order_date: date
    formatting:
      amount:
        type: currency
        precision: 2
    default_formatting:
      type: number
      precision: 1
    column_labels:
      order_month: Month
    data_quality:
      missing_values:
        strategy: fill_median
        fields: [quantity]
      outliers:
        rules:
          - fields: [amount]
            method: percentile
            action: flag
            lower: 1
            upper: 99
  pages:
    - id: summary
      title: Summary
      filters:
        - id: region_pick
          field: region
          type: multiselect
          label: Region
        - id: period
          field: order_date
          type: date_range
          label: Order date
      metrics:
        - id: total_revenue
          field: amount
          aggregation: sum
          label: Total revenue
        - id: north_revenue
          field: amount
          aggregation: sum
          label: North revenue
          filter:
            field: region
            operator: eq
            value: north
        - id: average_quantity
          field: quantity
          aggregation: mean
          label: Average quantity
          format: number
      layout:
        type: grid
        components:
          - type: metric_card
            metric_id: total_revenue
            width: half
          - type: metric_card
            metric_id: north_revenue
            width: half
          - type: visualization
            title: Revenue by region
            visualization:
              chart_type: bar
              roles:
                x: region
                y: amount
              params:
                horizontal: false
          - type: text
            text: Figures exclude cancelled orders.
"#;

/// Declared schema of [`SALES_SPEC`].
pub fn sales_catalog() -> FieldCatalog {
    FieldCatalog::new()
        .with_field("amount", FieldType::Float)
        .with_field("quantity", FieldType::Integer)
        .with_field("region", FieldType::String)
        .with_field("order_month", FieldType::Integer)
        .with_field("order_date", FieldType::Date)
}

/// Five transactions; `amount` = [10, 50, 150, 20, 99].
pub fn scenario_a_dataset() -> Dataset {
    Dataset::from_columns(vec![
        (
            "transaction_id",
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef,
        ),
        (
            "amount",
            Arc::new(Float64Array::from(vec![10.0, 50.0, 150.0, 20.0, 99.0])) as ArrayRef,
        ),
    ])
    .expect("scenario A columns have equal length")
}

/// Eight orders over four regions and four months; one `quantity` is null.
pub fn sales_dataset() -> Dataset {
    let day = |month, day| {
        epoch_days(NaiveDate::from_ymd_opt(2024, month, day).expect("valid fixture date"))
    };
    Dataset::from_columns(vec![
        (
            "amount",
            Arc::new(Float64Array::from(vec![
                120.5, 80.0, 200.0, 45.25, 310.0, 99.99, 150.0, 60.0,
            ])) as ArrayRef,
        ),
        (
            "quantity",
            Arc::new(Int64Array::from(vec![
                Some(2),
                Some(1),
                Some(4),
                None,
                Some(6),
                Some(2),
                Some(3),
                Some(1),
            ])) as ArrayRef,
        ),
        (
            "region",
            Arc::new(StringArray::from(vec![
                "north", "south", "north", "east", "west", "north", "south", "east",
            ])) as ArrayRef,
        ),
        (
            "order_month",
            Arc::new(Int64Array::from(vec![1, 1, 2, 2, 3, 3, 4, 4])) as ArrayRef,
        ),
        (
            "order_date",
            Arc::new(Date32Array::from(vec![
                day(1, 5),
                day(1, 20),
                day(2, 3),
                day(2, 17),
                day(3, 9),
                day(3, 28),
                day(4, 2),
                day(4, 21),
            ])) as ArrayRef,
        ),
    ])
    .expect("sales columns have equal length")
}

/// `n` rows of a float column named `value` holding `f(row)`.
pub fn numeric_dataset(n: usize, f: impl Fn(usize) -> f64) -> Dataset {
    Dataset::from_columns(vec![(
        "value",
        Arc::new(Float64Array::from((0..n).map(f).collect::<Vec<_>>())) as ArrayRef,
    )])
    .expect("single column dataset")
}
