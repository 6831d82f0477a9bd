//! Compiler: validated spec → immutable [`CompiledPlan`].
//!
//! The compiler resolves every field reference to a [`FieldRef`], every
//! metric-card reference to a metric position, and materializes every
//! default the spec leaves implicit:
//!
//! - filter labels and metric labels (from column labels or [`auto_label`])
//! - filter default selections (absent → [`Selection::All`])
//! - display formats, with `default_formatting` merged underneath and the
//!   currency taken from the format, then `metadata.currency`, then the
//!   configured default
//! - outlier parameters (percentile bounds 1/99, z-score 3.0, IQR 1.5,
//!   contamination from [`DataQualityConfig`])
//! - validation rule values and `coerce` defaults, typed against their field
//! - component ids (`component_<n>`) and widths (`full`)
//!
//! Pages, filters, metrics and components keep their declaration order.
//!
//! Compilation only accepts a [`ValidatedSpec`]. Any error it returns means
//! the validators let something through that they should have reported.

pub mod ir;

pub use ir::*;

use crate::catalog::FieldCatalog;
use crate::config::{DataQualityConfig, EngineConfig, FormatDefaults};
use crate::error::{DashSpecError, Result};
use crate::execution::selection::{Predicate, Scalar, Selection};
use crate::formatting::{auto_label, axis_label, column_label, ResolvedFormat};
use crate::registry::ChartRegistry;
use crate::spec::{
    AggregationKind, Component, DataQualityBlock, FieldFormat, FormatKind, Metric,
    OutlierMethod, Page, Spec, ValidationRule, Visualization, Width,
};
use crate::validation::ValidatedSpec;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

const DEFAULT_LOWER_PERCENTILE: f64 = 1.0;
const DEFAULT_UPPER_PERCENTILE: f64 = 99.0;
const DEFAULT_ZSCORE_THRESHOLD: f64 = 3.0;
const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Builds [`CompiledPlan`]s.
///
/// A compiler is immutable configuration; one instance can compile any
/// number of specs, from any number of threads.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: ChartRegistry,
    formatting: FormatDefaults,
    data_quality: DataQualityConfig,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(ChartRegistry::standard())
    }
}

impl Compiler {
    pub fn new(registry: ChartRegistry) -> Self {
        Self {
            registry,
            formatting: FormatDefaults::default(),
            data_quality: DataQualityConfig::default(),
        }
    }

    /// Takes formatting and data quality defaults from `config`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.formatting = config.formatting.clone();
        self.data_quality = config.data_quality.clone();
        self
    }

    pub fn registry(&self) -> &ChartRegistry {
        &self.registry
    }

    /// Compiles a validated spec.
    ///
    /// # Errors
    ///
    /// Returns [`DashSpecError::Compilation`] when the spec breaks an
    /// invariant validation should have enforced, such as a field missing
    /// from the catalog or a default that does not convert.
    #[instrument(skip_all, fields(dashboard = %validated.spec().dashboard.id))]
    pub fn compile(&self, validated: &ValidatedSpec) -> Result<CompiledPlan> {
        let spec = validated.spec();
        let build = Build::new(self, spec, validated.catalog());

        let formats = build.field_formats()?;
        let labels = build
            .catalog
            .names()
            .map(|name| (name.to_string(), build.label(name)))
            .collect();
        let data_quality = match &spec.dashboard.data_source.data_quality {
            Some(block) => build.data_quality(block)?,
            None => DataQualityPlan::default(),
        };
        let pages = spec
            .dashboard
            .pages
            .iter()
            .enumerate()
            .map(|(idx, page)| build.page(idx, page, &formats))
            .collect::<Result<Vec<_>>>()?;

        let plan = CompiledPlan {
            version: spec.version.clone(),
            dashboard_id: spec.dashboard.id.clone(),
            title: spec.dashboard.title.clone(),
            description: spec.dashboard.description.clone(),
            source: SourcePlan {
                kind: spec.dashboard.data_source.kind,
                path: spec.dashboard.data_source.path.clone(),
            },
            catalog: build.catalog.clone(),
            data_quality,
            formats,
            labels,
            pages,
        };

        info!(
            pages = plan.pages.len(),
            fields = plan.catalog.len(),
            dq_steps = plan.data_quality.outliers.len(),
            "Compiled dashboard plan"
        );
        Ok(plan)
    }
}

/// State of one compilation.
struct Build<'a> {
    compiler: &'a Compiler,
    spec: &'a Spec,
    catalog: &'a FieldCatalog,
    currency: String,
}

impl<'a> Build<'a> {
    fn new(compiler: &'a Compiler, spec: &'a Spec, catalog: &'a FieldCatalog) -> Self {
        let currency = spec
            .dashboard
            .metadata
            .as_ref()
            .and_then(|m| m.currency.clone())
            .unwrap_or_else(|| compiler.formatting.default_currency.clone());
        Self {
            compiler,
            spec,
            catalog,
            currency,
        }
    }

    fn field(&self, name: &str, path: &str) -> Result<FieldRef> {
        match (self.catalog.get(name), self.catalog.index_of(name)) {
            (Some(field_type), Some(index)) => Ok(FieldRef {
                name: name.to_string(),
                index,
                field_type,
            }),
            _ => Err(DashSpecError::compilation(format!(
                "{path} references field '{name}' missing from the catalog"
            ))),
        }
    }

    fn label(&self, field: &str) -> String {
        column_label(field, &self.spec.dashboard.data_source.column_labels)
    }

    fn resolve_format(&self, format: &FieldFormat, path: &str) -> Result<ResolvedFormat> {
        let mut resolved = ResolvedFormat::new(format.kind);
        if let Some(precision) = format.precision {
            let precision = u8::try_from(precision).map_err(|_| {
                DashSpecError::compilation(format!("{path} has precision {precision} out of range"))
            })?;
            resolved = resolved.with_precision(precision);
        }
        if let Some(grouping) = format.use_thousands_separator {
            resolved = resolved.with_thousands_separator(grouping);
        }
        if format.kind == FormatKind::Currency {
            let code = format
                .currency_code
                .clone()
                .unwrap_or_else(|| self.currency.clone());
            resolved = resolved.with_currency(code);
        }
        Ok(resolved)
    }

    /// Display formats for catalog fields.
    ///
    /// Explicitly formatted fields get their format merged over
    /// `default_formatting`; other numeric fields get the default alone.
    fn field_formats(&self) -> Result<BTreeMap<String, ResolvedFormat>> {
        let source = &self.spec.dashboard.data_source;
        let default = source.default_formatting.as_ref();
        let mut formats = BTreeMap::new();

        for (field, format) in &source.formatting {
            if !self.catalog.contains(field) {
                debug!(field = %field, "Format for unknown field dropped");
                continue;
            }
            let merged = match default {
                Some(default) => format.merged_over(default),
                None => format.clone(),
            };
            let path = format!("/dashboard/data_source/formatting/{field}");
            formats.insert(field.clone(), self.resolve_format(&merged, &path)?);
        }

        if let Some(default) = default {
            let resolved =
                self.resolve_format(default, "/dashboard/data_source/default_formatting")?;
            for (field, field_type) in self.catalog.iter() {
                if field_type.is_numeric() && !formats.contains_key(field) {
                    formats.insert(field.to_string(), resolved.clone());
                }
            }
        }
        Ok(formats)
    }

    fn page(
        &self,
        page_idx: usize,
        page: &Page,
        formats: &BTreeMap<String, ResolvedFormat>,
    ) -> Result<PagePlan> {
        let base = format!("/dashboard/pages/{page_idx}");

        let filters = page
            .filters
            .iter()
            .enumerate()
            .map(|(idx, filter)| {
                let path = format!("{base}/filters/{idx}");
                let field = self.field(&filter.field, &path)?;
                let default =
                    Selection::from_default(filter.kind, field.field_type, filter.default.as_ref())
                        .map_err(|reason| {
                            DashSpecError::compilation(format!("{path}/default: {reason}"))
                        })?;
                Ok(FilterPlan {
                    id: filter.id.clone(),
                    label: filter
                        .label
                        .clone()
                        .unwrap_or_else(|| self.label(&filter.field)),
                    kind: filter.kind,
                    field,
                    default,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let metrics = page
            .metrics
            .iter()
            .enumerate()
            .map(|(idx, metric)| self.metric(metric, &format!("{base}/metrics/{idx}"), formats))
            .collect::<Result<Vec<_>>>()?;

        let components = page
            .layout
            .components
            .iter()
            .enumerate()
            .map(|(idx, component)| {
                self.component(
                    idx,
                    component,
                    page,
                    &format!("{base}/layout/components/{idx}"),
                    formats,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PagePlan {
            id: page.id.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            filters,
            metrics,
            layout: page.layout.kind,
            components,
        })
    }

    fn metric(
        &self,
        metric: &Metric,
        path: &str,
        formats: &BTreeMap<String, ResolvedFormat>,
    ) -> Result<MetricPlan> {
        let field = self.field(&metric.field, path)?;

        let condition = match &metric.filter {
            Some(sub) => {
                let sub_path = format!("{path}/filter");
                let sub_field = self.field(&sub.field, &sub_path)?;
                let predicate =
                    Predicate::from_value(sub.operator, sub_field.field_type, &sub.value)
                        .map_err(|reason| {
                            DashSpecError::compilation(format!("{sub_path}: {reason}"))
                        })?;
                Some(ConditionPlan {
                    field: sub_field,
                    predicate,
                })
            }
            None => None,
        };

        let label = metric.label.clone().unwrap_or_else(|| {
            format!(
                "{} of {}",
                auto_label(metric.aggregation.as_str()),
                self.label(&metric.field)
            )
        });

        Ok(MetricPlan {
            id: metric.id.clone(),
            aggregation: metric.aggregation,
            format: self.metric_format(metric, formats),
            field,
            condition,
            label,
        })
    }

    /// Counts are whole numbers and never inherit the field's format; other
    /// aggregations are shown like the field they aggregate.
    fn metric_format(
        &self,
        metric: &Metric,
        formats: &BTreeMap<String, ResolvedFormat>,
    ) -> ResolvedFormat {
        let counts = matches!(
            metric.aggregation,
            AggregationKind::Count | AggregationKind::CountUnique
        );
        let inherited = if counts {
            None
        } else {
            formats.get(&metric.field).cloned()
        };

        let mut format = match (metric.format, inherited) {
            (Some(kind), Some(field_format)) => ResolvedFormat {
                kind,
                ..field_format
            },
            (Some(kind), None) => ResolvedFormat::new(kind),
            (None, Some(field_format)) => field_format,
            (None, None) if counts => ResolvedFormat::new(FormatKind::Integer),
            (None, None) => ResolvedFormat::new(FormatKind::Number),
        };
        if format.kind == FormatKind::Currency && format.currency_code.is_none() {
            format.currency_code = Some(self.currency.clone());
        }
        format
    }

    fn component(
        &self,
        idx: usize,
        component: &Component,
        page: &Page,
        path: &str,
        formats: &BTreeMap<String, ResolvedFormat>,
    ) -> Result<ComponentPlan> {
        let body = match component {
            Component::Visualization { visualization, .. } => {
                ComponentBody::Visualization(self.visualization(visualization, path, formats)?)
            }
            Component::Text { text, .. } => ComponentBody::Text(text.clone()),
            Component::MetricCard { metric_id, .. } => {
                let metric_index = page
                    .metrics
                    .iter()
                    .position(|m| &m.id == metric_id)
                    .ok_or_else(|| {
                        DashSpecError::compilation(format!(
                            "{path}/metric_id references unknown metric '{metric_id}'"
                        ))
                    })?;
                ComponentBody::MetricCard {
                    metric_id: metric_id.clone(),
                    metric_index,
                }
            }
        };

        Ok(ComponentPlan {
            id: component
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("component_{idx}")),
            title: component.title().map(str::to_string),
            width: component.width().unwrap_or(Width::Full),
            body,
        })
    }

    fn visualization(
        &self,
        viz: &Visualization,
        path: &str,
        formats: &BTreeMap<String, ResolvedFormat>,
    ) -> Result<VisualizationPlan> {
        if self.compiler.registry.descriptor(viz.chart_type).is_none() {
            return Err(DashSpecError::compilation(format!(
                "{path} uses unregistered chart type '{}'",
                viz.chart_type
            )));
        }

        let column_labels = &self.spec.dashboard.data_source.column_labels;
        let mut roles = BTreeMap::new();
        let mut role_labels = BTreeMap::new();
        for (role, field) in &viz.roles {
            let field_ref = self.field(field, &format!("{path}/visualization/roles/{role}"))?;
            role_labels.insert(*role, axis_label(field, column_labels, formats.get(field)));
            roles.insert(*role, field_ref);
        }

        Ok(VisualizationPlan {
            chart: viz.chart_type,
            roles,
            role_labels,
            params: viz.params.clone(),
        })
    }

    fn data_quality(&self, block: &DataQualityBlock) -> Result<DataQualityPlan> {
        let base = "/dashboard/data_source/data_quality";
        let config = &self.compiler.data_quality;

        let missing = match &block.missing_values {
            Some(rule) => {
                let fields = match &rule.fields {
                    Some(fields) => fields
                        .iter()
                        .map(|f| self.field(f, &format!("{base}/missing_values")))
                        .collect::<Result<Vec<_>>>()?,
                    None => self.all_fields()?,
                };
                Some(MissingPlan {
                    strategy: rule.strategy,
                    fill_value: rule.fill_value.clone(),
                    fields,
                    max_missing_fraction: rule
                        .max_missing_fraction
                        .unwrap_or(config.auto_missing_threshold),
                })
            }
            None => None,
        };

        let duplicates = match &block.duplicates {
            Some(rule) if rule.enabled => Some(DuplicatePlan {
                subset: rule
                    .subset
                    .iter()
                    .flatten()
                    .map(|f| self.field(f, &format!("{base}/duplicates/subset")))
                    .collect::<Result<Vec<_>>>()?,
                keep: rule.keep,
                action: rule.action,
            }),
            _ => None,
        };

        let mut outliers = Vec::new();
        if let Some(block) = block.outliers.as_ref().filter(|o| o.enabled) {
            for (rule_idx, rule) in block.rules.iter().enumerate() {
                let path = format!("{base}/outliers/rules/{rule_idx}");
                let threshold = rule.threshold.unwrap_or(match rule.method {
                    OutlierMethod::Iqr => DEFAULT_IQR_MULTIPLIER,
                    _ => DEFAULT_ZSCORE_THRESHOLD,
                });
                for field in &rule.fields {
                    outliers.push(OutlierPlan {
                        field: self.field(field, &path)?,
                        method: rule.method,
                        action: rule.action,
                        lower: rule.lower.unwrap_or(DEFAULT_LOWER_PERCENTILE),
                        upper: rule.upper.unwrap_or(DEFAULT_UPPER_PERCENTILE),
                        threshold,
                        contamination: rule.contamination.unwrap_or(config.default_contamination),
                    });
                }
            }
        }

        let rules = block
            .validation
            .iter()
            .flat_map(|v| v.rules.iter())
            .enumerate()
            .map(|(idx, rule)| self.validation_rule(rule, &format!("{base}/validation/rules/{idx}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(DataQualityPlan {
            missing,
            duplicates,
            outliers,
            rules,
        })
    }

    fn validation_rule(&self, rule: &ValidationRule, path: &str) -> Result<ValidationRulePlan> {
        let field = self.field(&rule.field, path)?;
        let typed = |value: &serde_json::Value, at: &str| {
            Scalar::from_value(field.field_type, value)
                .map_err(|reason| DashSpecError::compilation(format!("{path}/{at}: {reason}")))
        };
        let values = rule
            .values
            .iter()
            .flatten()
            .map(|value| typed(value, "values"))
            .collect::<Result<Vec<_>>>()?;
        let default = rule.default.as_ref().map(|value| typed(value, "default")).transpose()?;
        Ok(ValidationRulePlan {
            constraint: rule.constraint,
            action: rule.action,
            min: rule.min,
            max: rule.max,
            values,
            default,
            field,
        })
    }

    fn all_fields(&self) -> Result<Vec<FieldRef>> {
        self.catalog
            .names()
            .map(|name| self.field(name, "/dashboard/data_source/schema"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DashSpec;
    use crate::spec::{ChartKind, FieldType, Role};
    use crate::test_fixtures::{sales_catalog, SALES_SPEC, SCENARIO_A_SPEC};

    fn validated(text: &str, catalog: &FieldCatalog) -> ValidatedSpec {
        DashSpec::new().check(text, Some(catalog)).unwrap()
    }

    fn scenario_a() -> CompiledPlan {
        let catalog = FieldCatalog::new()
            .with_field("transaction_id", FieldType::Integer)
            .with_field("amount", FieldType::Float);
        Compiler::default()
            .compile(&validated(SCENARIO_A_SPEC, &catalog))
            .unwrap()
    }

    fn sales() -> CompiledPlan {
        Compiler::default()
            .compile(&validated(SALES_SPEC, &sales_catalog()))
            .unwrap()
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let a = sales();
        let b = sales();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn test_plan_survives_json() {
        let plan = sales();
        let restored = CompiledPlan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(restored, plan);
        assert!(matches!(
            CompiledPlan::from_json("{}"),
            Err(DashSpecError::Internal(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_ne!(
            scenario_a().fingerprint().unwrap(),
            sales().fingerprint().unwrap()
        );
    }

    #[test]
    fn test_references_resolve_in_declaration_order() {
        let plan = scenario_a();
        let page = plan.page("overview").unwrap();
        assert_eq!(page.filters[0].id, "amount_range");
        assert_eq!(page.filters[0].field.field_type, FieldType::Float);
        assert_eq!(page.filters[0].default, Selection::range(0.0, 100.0));
        assert_eq!(page.metrics[0].id, "transaction_count");
        assert_eq!(page.metrics[1].id, "average_amount");
        // catalog order is by name: amount, transaction_id
        assert_eq!(page.metrics[0].field.index, 1);
        assert!(matches!(
            page.components[1].body,
            ComponentBody::MetricCard { metric_index: 0, .. }
        ));
    }

    #[test]
    fn test_defaults_are_materialized() {
        let plan = sales();
        let page = &plan.pages[0];

        assert_eq!(page.filter("region_pick").unwrap().default, Selection::All);
        assert_eq!(page.components[2].id, "component_2");
        assert_eq!(page.components[2].width, Width::Full);
        assert_eq!(plan.label("order_month"), Some("Month"));
        assert_eq!(plan.label("order_date"), Some("Order Date"));

        let amount = &plan.formats["amount"];
        assert_eq!(amount.kind, FormatKind::Currency);
        assert_eq!(amount.precision, Some(2));
        assert_eq!(amount.currency_code.as_deref(), Some("USD"));
        // numeric fields without an explicit format take the default one
        assert_eq!(plan.formats["quantity"].kind, FormatKind::Number);
        assert_eq!(plan.formats["quantity"].precision, Some(1));
        assert!(!plan.formats.contains_key("region"));

        let rule = &plan.data_quality.outliers[0];
        assert_eq!((rule.lower, rule.upper), (1.0, 99.0));
        assert_eq!(rule.contamination, 0.05);
        assert_eq!(plan.data_quality.missing.as_ref().unwrap().fields.len(), 1);
    }

    #[test]
    fn test_validation_rules_are_typed() {
        let text = SALES_SPEC.replace(
            "    data_quality:\n",
            "    data_quality:\n      validation:\n        rules:\n          - {field: quantity, constraint: in_set, values: [1, 2.0], action: coerce, default: 0}\n          - {field: amount, constraint: range, min: 0}\n",
        );
        let plan = Compiler::default()
            .compile(&validated(&text, &sales_catalog()))
            .unwrap();
        let rules = &plan.data_quality.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].field.field_type, FieldType::Integer);
        assert_eq!(rules[0].values, vec![Scalar::Int(1), Scalar::Int(2)]);
        assert_eq!(rules[0].default, Some(Scalar::Int(0)));
        assert_eq!(rules[1].action, crate::spec::ValidationAction::Flag);
        assert_eq!((rules[1].min, rules[1].max), (Some(0.0), None));
        assert!(!plan.data_quality.is_empty());
    }

    #[test]
    fn test_metric_formats() {
        let plan = sales();
        let page = &plan.pages[0];
        let revenue = page.metric("total_revenue").unwrap();
        assert_eq!(revenue.format.kind, FormatKind::Currency);
        assert_eq!(revenue.format.format(1234.5), "$1,234.50");
        assert!(page.metric("north_revenue").unwrap().condition.is_some());

        let scenario = scenario_a();
        let count = scenario.pages[0].metric("transaction_count").unwrap();
        assert_eq!(count.format.kind, FormatKind::Integer);
    }

    #[test]
    fn test_role_labels_carry_units() {
        let plan = sales();
        let ComponentBody::Visualization(viz) = &plan.pages[0].components[2].body else {
            panic!("expected a visualization");
        };
        assert_eq!(viz.chart, ChartKind::Bar);
        assert_eq!(viz.role_labels[&Role::Y], "Amount (USD)");
        assert_eq!(viz.role_labels[&Role::X], "Region");
    }

    #[test]
    fn test_generated_metric_label() {
        let text = SCENARIO_A_SPEC.replace("          label: Transactions\n", "");
        let catalog = FieldCatalog::new()
            .with_field("transaction_id", FieldType::Integer)
            .with_field("amount", FieldType::Float);
        let plan = Compiler::default()
            .compile(&validated(&text, &catalog))
            .unwrap();
        assert_eq!(plan.pages[0].metrics[0].label, "Count of Transaction Id");
    }
}
