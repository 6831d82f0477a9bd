//! Execution Engine.
//!
//! Runs a [`CompiledPlan`] against a dataset:
//!
//! 1. the data quality plan is applied once, to the whole dataset;
//! 2. for each page, the active filter selections (or their defaults) narrow
//!    the rows;
//! 3. each metric aggregates the page rows, narrowed further by its own
//!    sub-filter, and is formatted.
//!
//! The engine holds configuration only. One engine, and one plan, can serve
//! any number of concurrent executions.

pub mod aggregate;
pub mod filters;
pub mod selection;

pub use selection::{Operand, Predicate, Scalar, Selection};

use crate::compiler::{CompiledPlan, MetricPlan, PagePlan};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::{DashSpecError, Result};
use crate::formatting::format_optional;
use crate::log_exec;
use crate::quality::{DataQualityEngine, DqLogEntry};
use crate::spec::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Runtime inputs of an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    /// Active selection per filter id; absent filters use their default.
    #[serde(default)]
    pub filters: BTreeMap<String, Selection>,
}

impl ExecutionInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter_id: impl Into<String>, selection: Selection) -> Self {
        self.filters.insert(filter_id.into(), selection);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub label: String,
    /// Rounded aggregate; `None` when undefined.
    pub raw_value: Option<f64>,
    pub formatted_value: String,
    /// Degradations hit while computing the metric.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageExecution {
    pub page_id: String,
    pub filtered_row_count: usize,
    /// Selection actually applied per filter.
    pub active_filters: BTreeMap<String, Selection>,
    pub metrics: BTreeMap<String, MetricResult>,
    /// Display strings, row by row, for every formatted numeric field.
    pub formatted_fields: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<String>,
    /// Rows left after the page filters.
    #[serde(skip)]
    pub data: Dataset,
}

impl PageExecution {
    pub fn metric(&self, id: &str) -> Option<&MetricResult> {
        self.metrics.get(id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardExecution {
    pub dashboard_id: String,
    /// Rows after data quality, before page filters.
    pub row_count: usize,
    pub dq_log: Vec<DqLogEntry>,
    pub pages: Vec<PageExecution>,
}

impl DashboardExecution {
    pub fn page(&self, id: &str) -> Option<&PageExecution> {
        self.pages.iter().find(|page| page.page_id == id)
    }
}

/// Executes compiled plans.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: EngineConfig,
    quality: DataQualityEngine,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let quality = DataQualityEngine::new(config.data_quality.clone())
            .with_log_config(config.logging.clone());
        Self { config, quality }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes every page of `plan`.
    ///
    /// # Errors
    ///
    /// Only Arrow kernel failures propagate. Empty data, missing columns and
    /// undefined aggregates degrade to sentinels with warnings.
    #[instrument(skip_all, fields(dashboard = %plan.dashboard_id, rows = dataset.num_rows()))]
    pub fn execute(
        &self,
        plan: &CompiledPlan,
        dataset: &Dataset,
        input: &ExecutionInput,
    ) -> Result<DashboardExecution> {
        self.warn_unknown_filters(plan.pages.iter(), input);
        let outcome = self.quality.apply(dataset, &plan.data_quality)?;

        let pages = plan
            .pages
            .iter()
            .map(|page| self.run_page(plan, page, &outcome.dataset, input))
            .collect::<Result<Vec<_>>>()?;

        info!(
            pages = pages.len(),
            dq_steps = outcome.log.len(),
            "Dashboard executed"
        );
        Ok(DashboardExecution {
            dashboard_id: plan.dashboard_id.clone(),
            row_count: outcome.dataset.num_rows(),
            dq_log: outcome.log,
            pages,
        })
    }

    /// Executes a single page, data quality included.
    ///
    /// # Errors
    ///
    /// Returns [`DashSpecError::Configuration`] for an unknown page id.
    #[instrument(skip_all, fields(dashboard = %plan.dashboard_id, page = page_id))]
    pub fn execute_page(
        &self,
        plan: &CompiledPlan,
        page_id: &str,
        dataset: &Dataset,
        input: &ExecutionInput,
    ) -> Result<PageExecution> {
        let page = plan.page(page_id).ok_or_else(|| {
            DashSpecError::Configuration(format!("plan has no page '{page_id}'"))
        })?;
        self.warn_unknown_filters(std::iter::once(page), input);
        let outcome = self.quality.apply(dataset, &plan.data_quality)?;
        self.run_page(plan, page, &outcome.dataset, input)
    }

    fn warn_unknown_filters<'a>(
        &self,
        pages: impl Iterator<Item = &'a PagePlan>,
        input: &ExecutionInput,
    ) {
        let known: Vec<&str> = pages
            .flat_map(|page| page.filters.iter().map(|f| f.id.as_str()))
            .collect();
        for id in input.filters.keys() {
            if !known.contains(&id.as_str()) {
                debug!(filter = %id, "Selection for unknown filter ignored");
            }
        }
    }

    fn run_page(
        &self,
        plan: &CompiledPlan,
        page: &PagePlan,
        dataset: &Dataset,
        input: &ExecutionInput,
    ) -> Result<PageExecution> {
        let mut warnings = Vec::new();
        let mut active_filters = BTreeMap::new();
        let mut data = dataset.clone();

        for filter in &page.filters {
            let selection = match input.filters.get(&filter.id) {
                Some(selection) if selection.fits(filter.kind) => selection.clone(),
                Some(_) => {
                    warnings.push(format!(
                        "selection for filter '{}' does not fit a {} filter, default used",
                        filter.id, filter.kind
                    ));
                    filter.default.clone()
                }
                None => filter.default.clone(),
            };

            if selection != Selection::All {
                let Some(column) = data.column(&filter.field.name) else {
                    warnings.push(format!(
                        "filter '{}' skipped: column '{}' not in dataset",
                        filter.id, filter.field.name
                    ));
                    continue;
                };
                let mask = filters::selection_mask(&column, &selection);
                data = data.filter(&mask)?;
            }
            active_filters.insert(filter.id.clone(), selection);
        }

        let mut metrics = BTreeMap::new();
        for metric in &page.metrics {
            let result = self.compute_metric(metric, &data)?;
            metrics.insert(metric.id.clone(), result);
        }

        let formatted_fields = self.format_fields(plan, &data);

        for warning in &warnings {
            warn!(page = %page.id, "{warning}");
        }
        log_exec!(
            self.config.logging,
            page = %page.id,
            rows = data.num_rows(),
            metrics = metrics.len(),
            "Page executed"
        );

        Ok(PageExecution {
            page_id: page.id.clone(),
            filtered_row_count: data.num_rows(),
            active_filters,
            metrics,
            formatted_fields,
            warnings,
            data,
        })
    }

    fn compute_metric(&self, metric: &MetricPlan, data: &Dataset) -> Result<MetricResult> {
        let mut warnings = Vec::new();

        let rows = match &metric.condition {
            None => Some(data.clone()),
            Some(condition) => match data.column(&condition.field.name) {
                Some(column) => {
                    let mask = filters::predicate_mask(&column, &condition.predicate);
                    Some(data.filter(&mask)?)
                }
                None => {
                    warnings.push(format!(
                        "sub-filter column '{}' not in dataset",
                        condition.field.name
                    ));
                    None
                }
            },
        };

        let raw = match rows.as_ref().map(|rows| rows.column(&metric.field.name)) {
            Some(Some(column)) => {
                let value = aggregate::aggregate(metric.aggregation, &column);
                if value.is_none() && !column.is_empty() && column.null_count() < column.len() {
                    warnings.push(format!(
                        "{} is undefined for the values of '{}'",
                        metric.aggregation, metric.field.name
                    ));
                }
                value
            }
            Some(None) => {
                warnings.push(format!("column '{}' not in dataset", metric.field.name));
                None
            }
            None => None,
        };

        let precision = self.config.formatting.metric_precision;
        let raw_value = raw.map(|v| aggregate::round_to(v, precision));
        for warning in &warnings {
            warn!(metric = %metric.id, "{warning}");
        }

        Ok(MetricResult {
            label: metric.label.clone(),
            raw_value,
            formatted_value: format_optional(
                raw_value,
                &metric.format,
                &self.config.formatting.undefined_display,
            ),
            warnings,
        })
    }

    fn format_fields(&self, plan: &CompiledPlan, data: &Dataset) -> BTreeMap<String, Vec<String>> {
        let undefined = &self.config.formatting.undefined_display;
        plan.formats
            .iter()
            .filter_map(|(field, format)| {
                let column = data.column(field)?;
                if !matches!(column.field_type(), FieldType::Integer | FieldType::Float) {
                    return None;
                }
                let values = (0..column.len())
                    .map(|row| format_optional(column.f64_at(row), format, undefined))
                    .collect();
                Some((field.clone(), values))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::pipeline::DashSpec;
    use crate::test_fixtures::{sales_dataset, scenario_a_dataset, SALES_SPEC, SCENARIO_A_SPEC};

    fn compile(text: &str, dataset: &Dataset) -> CompiledPlan {
        let validated = DashSpec::new()
            .check(text, Some(&dataset.inferred_catalog()))
            .unwrap();
        Compiler::default().compile(&validated).unwrap()
    }

    #[test]
    fn test_scenario_a_default_range() {
        let dataset = scenario_a_dataset();
        let plan = compile(SCENARIO_A_SPEC, &dataset);
        let result = ExecutionEngine::default()
            .execute(&plan, &dataset, &ExecutionInput::new())
            .unwrap();
        let page = &result.pages[0];
        assert_eq!(page.filtered_row_count, 4);
        assert_eq!(page.metric("transaction_count").unwrap().raw_value, Some(4.0));
        assert_eq!(page.metric("transaction_count").unwrap().formatted_value, "4");
    }

    #[test]
    fn test_runtime_selection_overrides_default() {
        let dataset = scenario_a_dataset();
        let plan = compile(SCENARIO_A_SPEC, &dataset);
        let input = ExecutionInput::new().with_filter("amount_range", Selection::range(100.0, 200.0));
        let page = ExecutionEngine::default()
            .execute_page(&plan, "overview", &dataset, &input)
            .unwrap();
        assert_eq!(page.filtered_row_count, 1);
    }

    #[test]
    fn test_misfit_selection_falls_back_to_default() {
        let dataset = scenario_a_dataset();
        let plan = compile(SCENARIO_A_SPEC, &dataset);
        let input = ExecutionInput::new()
            .with_filter("amount_range", Selection::Value(Scalar::Int(3)));
        let page = ExecutionEngine::default()
            .execute_page(&plan, "overview", &dataset, &input)
            .unwrap();
        assert_eq!(page.filtered_row_count, 4);
        assert_eq!(page.warnings.len(), 1);
    }

    #[test]
    fn test_zero_matches_give_sentinels() {
        let dataset = scenario_a_dataset();
        let plan = compile(SCENARIO_A_SPEC, &dataset);
        let input =
            ExecutionInput::new().with_filter("amount_range", Selection::range(1000.0, 2000.0));
        let page = ExecutionEngine::default()
            .execute_page(&plan, "overview", &dataset, &input)
            .unwrap();
        assert_eq!(page.filtered_row_count, 0);
        assert_eq!(page.metric("transaction_count").unwrap().raw_value, Some(0.0));
        let average = page.metric("average_amount").unwrap();
        assert_eq!(average.raw_value, None);
        assert_eq!(average.formatted_value, "-");
    }

    #[test]
    fn test_unknown_page_is_an_error() {
        let dataset = scenario_a_dataset();
        let plan = compile(SCENARIO_A_SPEC, &dataset);
        let err = ExecutionEngine::default()
            .execute_page(&plan, "missing", &dataset, &ExecutionInput::new())
            .unwrap_err();
        assert!(matches!(err, DashSpecError::Configuration(_)));
    }

    #[test]
    fn test_sub_filter_narrows_page_rows() {
        let dataset = sales_dataset();
        let plan = compile(SALES_SPEC, &dataset);
        let result = ExecutionEngine::default()
            .execute(&plan, &dataset, &ExecutionInput::new())
            .unwrap();
        let page = &result.pages[0];
        let all = page.metric("total_revenue").unwrap().raw_value.unwrap();
        let north = page.metric("north_revenue").unwrap().raw_value.unwrap();
        assert!(north > 0.0 && north < all);
        assert!(page.formatted_fields["amount"][0].starts_with('$'));
    }
}
