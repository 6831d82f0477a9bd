//! # DashSpec - Declarative Dashboards for Rust
//!
//! DashSpec turns a declarative dashboard spec (pages, filters, metrics,
//! data quality rules, formatting and visualizations) into computed results
//! over an Arrow dataset.
//!
//! ## Overview
//!
//! The engine is a three-stage pipeline:
//!
//! ```text
//! spec text ─▶ SchemaValidator ─▶ SemanticValidator ─▶ ValidationPolicy ─▶ ValidatedSpec
//!                                                                              │
//!                                                                          Compiler
//!                                                                              ▼
//!            Dataset + ExecutionInput ─▶ ExecutionEngine ◀──────────── CompiledPlan
//!                                              │
//!                              DataQualityEngine, formatting
//!                                              ▼
//!                                     DashboardExecution
//! ```
//!
//! Validators never fail: they report [`Violation`](validation::Violation)s,
//! each with a severity, a path into the spec and a repair hint. The
//! [`ValidationPolicy`](validation::ValidationPolicy) alone decides whether
//! compilation may proceed. Execution never fails on data-shape edge cases
//! (empty data, constant fields, zero matches); it degrades to sentinels and
//! records what it did.
//!
//! ## Quick Start
//!
//! ```rust
//! use dashspec::prelude::*;
//! use arrow::array::{ArrayRef, Float64Array, Int64Array};
//! use std::sync::Arc;
//!
//! # fn main() -> dashspec::prelude::Result<()> {
//! let text = r#"
//! dsl_version: "1.3.0"
//! dashboard:
//!   id: transactions
//!   title: Transactions
//!   data_source:
//!     type: csv
//!     path: transactions.csv
//!     schema: {transaction_id: integer, amount: float}
//!     formatting:
//!       amount: {type: currency, precision: 2}
//!   pages:
//!     - id: overview
//!       title: Overview
//!       filters:
//!         - {id: amount_range, field: amount, type: range, label: Amount, default: [0, 100]}
//!       metrics:
//!         - {id: revenue, field: amount, aggregation: sum, label: Revenue}
//!       layout:
//!         type: single
//!         components:
//!           - {type: metric_card, metric_id: revenue}
//! "#;
//!
//! let dataset = Dataset::from_columns(vec![
//!     ("transaction_id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
//!     ("amount", Arc::new(Float64Array::from(vec![10.0, 150.0, 1224.5])) as ArrayRef),
//! ])?;
//!
//! let dashspec = DashSpec::new();
//! let plan = dashspec.compile(text, Some(&dataset.inferred_catalog()))?;
//!
//! // default selection: amount in [0, 100]
//! let engine = ExecutionEngine::default();
//! let page = engine.execute_page(&plan, "overview", &dataset, &ExecutionInput::new())?;
//! assert_eq!(page.metric("revenue").unwrap().formatted_value, "$10.00");
//!
//! // runtime selection
//! let input = ExecutionInput::new().with_filter("amount_range", Selection::range(0.0, 2000.0));
//! let page = engine.execute_page(&plan, "overview", &dataset, &input)?;
//! assert_eq!(page.metric("revenue").unwrap().formatted_value, "$1,384.50");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`spec`**: closed data model, enumerated vocabulary, YAML front-end
//! - **`validation`**: schema and semantic validators, violation codes, policy
//! - **`registry`**: chart kinds with their required roles and parameters
//! - **`compiler`**: resolves references into an immutable [`CompiledPlan`](compiler::CompiledPlan)
//! - **`dataset`**: Arrow `RecordBatch` normalized to the five field types
//! - **`quality`**: missing values, duplicates and outlier detection
//! - **`execution`**: filters, metric aggregation and the result bundle
//! - **`formatting`**: pure number formatting and column labels
//! - **`formatters`**: JSON, human and Markdown violation reports
//! - **`pipeline`**: the [`DashSpec`](pipeline::DashSpec) facade
//!
//! The crate performs no I/O. Loading the dataset, rendering the results and
//! installing a `tracing` subscriber are left to the host; see
//! [`logging::setup`] for a ready-made subscriber.

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod dataset;
pub mod error;
pub mod execution;
pub mod formatters;
pub mod formatting;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod quality;
pub mod registry;
pub mod spec;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
