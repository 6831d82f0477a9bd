//! Cross-referential and domain checks over the typed spec.

use super::{codes, pointer_segment, Fix, IdScope, Severity, Violation};
use crate::catalog::FieldCatalog;
use crate::execution::selection::{Predicate, Scalar, Selection};
use crate::formatting::currency_symbol;
use crate::registry::ChartRegistry;
use crate::spec::{
    Component, DataQualityBlock, FieldFormat, FieldType, FilterKind, MissingValueStrategy,
    OutlierMethod, Page, Spec, ValidationConstraint, ValidationRule, Visualization,
};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Inclusive range accepted for format precision.
pub const PRECISION_RANGE: (i64, i64) = (0, 10);

const TEMPORAL_NAMES: &[&str] = &[
    "year",
    "month",
    "quarter",
    "day",
    "week",
    "hour",
    "minute",
    "second",
    "day_of_week",
    "day_of_month",
    "day_of_year",
    "week_of_year",
    "hour_of_day",
    "minute_of_hour",
];

const TEMPORAL_SUFFIXES: &[&str] = &["_year", "_month", "_quarter", "_day", "_week"];

/// Whether an integer field name looks like a discrete calendar component.
pub fn looks_temporal(field: &str) -> bool {
    let lower = field.to_lowercase();
    TEMPORAL_NAMES.contains(&lower.as_str())
        || TEMPORAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Checks identifiers, references and domain rules of a typed spec against a
/// field catalog and a chart registry.
#[derive(Debug, Clone, Default)]
pub struct SemanticValidator {
    registry: ChartRegistry,
}

impl SemanticValidator {
    pub fn new(registry: ChartRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ChartRegistry {
        &self.registry
    }

    /// Returns every semantic violation, in document order.
    ///
    /// Field references are resolved against `catalog`; when the catalog is
    /// empty a single `MISSING_SCHEMA` violation replaces the per-reference
    /// reports.
    #[instrument(skip_all, fields(dashboard = %spec.dashboard.id))]
    pub fn validate(&self, spec: &Spec, catalog: &FieldCatalog) -> Vec<Violation> {
        let mut checker = Checker {
            registry: &self.registry,
            catalog,
            resolve_fields: !catalog.is_empty(),
            out: Vec::new(),
        };

        if catalog.is_empty() {
            checker.out.push(Violation::new(
                codes::MISSING_SCHEMA,
                Severity::Critical,
                "No field schema is declared and none was inferred from the dataset",
                "/dashboard/data_source/schema",
                "Declare the dataset fields under data_source.schema",
            ));
        }

        checker.check_unique(
            spec.dashboard.pages.iter().map(|p| Some(p.id.as_str())),
            IdScope::Page,
            "/dashboard/pages",
            "page",
        );
        for (idx, page) in spec.dashboard.pages.iter().enumerate() {
            checker.check_page(idx, page);
        }
        checker.check_data_source(spec);

        debug!(violations = checker.out.len(), "Semantic validation finished");
        checker.out
    }
}

struct Checker<'a> {
    registry: &'a ChartRegistry,
    catalog: &'a FieldCatalog,
    resolve_fields: bool,
    out: Vec<Violation>,
}

impl Checker<'_> {
    fn push(&mut self, violation: Violation) {
        self.out.push(violation);
    }

    fn available_fields(&self) -> String {
        const SHOWN: usize = 12;
        let mut names: Vec<&str> = self.catalog.names().take(SHOWN).collect();
        if self.catalog.len() > SHOWN {
            names.push("…");
        }
        names.join(", ")
    }

    /// Resolves a field reference, reporting `code` when it dangles.
    fn resolve(&mut self, field: &str, path: String, code: &str, what: &str) -> Option<FieldType> {
        if !self.resolve_fields {
            return None;
        }
        match self.catalog.get(field) {
            Some(field_type) => Some(field_type),
            None => {
                let repair = format!(
                    "Use a field from the dataset schema ({}) or add '{field}' to it",
                    self.available_fields()
                );
                self.push(Violation::new(
                    code,
                    Severity::Critical,
                    format!("{what} references unknown field '{field}'"),
                    path,
                    repair,
                ));
                None
            }
        }
    }

    fn check_unique<'s>(
        &mut self,
        ids: impl Iterator<Item = Option<&'s str>> + Clone,
        scope: IdScope,
        base: &str,
        what: &str,
    ) {
        let mut used: BTreeSet<String> = ids.clone().flatten().map(str::to_string).collect();
        let mut seen = BTreeSet::new();

        for (index, id) in ids.enumerate() {
            let Some(id) = id else { continue };
            if seen.insert(id) {
                continue;
            }
            let new_id = (1..)
                .map(|n| format!("{id}_{n}"))
                .find(|candidate| !used.contains(candidate))
                .unwrap_or_else(|| format!("{id}_{index}"));
            used.insert(new_id.clone());

            self.push(
                Violation::new(
                    codes::DUPLICATE_ID,
                    Severity::Critical,
                    format!("Duplicate {what} id '{id}'"),
                    format!("{base}/{index}/id"),
                    format!("Rename the {what} to a unique id, e.g. '{new_id}'"),
                )
                .with_fix(Fix::RenameId {
                    scope,
                    index,
                    new_id,
                }),
            );
        }
    }

    fn check_page(&mut self, page_idx: usize, page: &Page) {
        let base = format!("/dashboard/pages/{page_idx}");

        self.check_unique(
            page.filters.iter().map(|f| Some(f.id.as_str())),
            IdScope::Filter { page: page_idx },
            &format!("{base}/filters"),
            "filter",
        );
        self.check_unique(
            page.metrics.iter().map(|m| Some(m.id.as_str())),
            IdScope::Metric { page: page_idx },
            &format!("{base}/metrics"),
            "metric",
        );
        self.check_unique(
            page.layout.components.iter().map(Component::id),
            IdScope::Component { page: page_idx },
            &format!("{base}/layout/components"),
            "component",
        );

        for (idx, filter) in page.filters.iter().enumerate() {
            let path = format!("{base}/filters/{idx}");
            let field_type = self.resolve(
                &filter.field,
                format!("{path}/field"),
                codes::UNKNOWN_FIELD,
                &format!("Filter '{}'", filter.id),
            );
            if filter.label.is_none() {
                self.push(Violation::new(
                    codes::MISSING_LABEL,
                    Severity::Info,
                    format!("Filter '{}' has no label", filter.id),
                    format!("{path}/label"),
                    "Add a human-readable label",
                ));
            }
            let Some(field_type) = field_type else { continue };

            let compatible = match filter.kind {
                FilterKind::Range | FilterKind::Slider => field_type.is_numeric(),
                FilterKind::DateRange => field_type == FieldType::Date,
                FilterKind::Select | FilterKind::Multiselect => true,
            };
            if !compatible {
                self.push(Violation::new(
                    codes::FILTER_KIND_TYPE_MISMATCH,
                    Severity::Error,
                    format!(
                        "Filter '{}' of type {} cannot target {} field '{}'",
                        filter.id, filter.kind, field_type, filter.field
                    ),
                    format!("{path}/type"),
                    "Use range/slider for numeric fields, date_range for dates, select/multiselect otherwise",
                ));
                continue;
            }

            if let Err(reason) =
                Selection::from_default(filter.kind, field_type, filter.default.as_ref())
            {
                self.push(Violation::new(
                    codes::FILTER_DEFAULT_MISMATCH,
                    Severity::Error,
                    format!("Filter '{}' has an invalid default: {reason}", filter.id),
                    format!("{path}/default"),
                    "Give a default shaped for the filter type, or remove it",
                ));
            }
        }

        let metric_ids: BTreeSet<&str> = page.metrics.iter().map(|m| m.id.as_str()).collect();
        for (idx, metric) in page.metrics.iter().enumerate() {
            let path = format!("{base}/metrics/{idx}");
            let what = format!("Metric '{}'", metric.id);
            if let Some(field_type) =
                self.resolve(&metric.field, format!("{path}/field"), codes::UNKNOWN_FIELD, &what)
            {
                if !metric.aggregation.accepts(field_type) {
                    self.push(Violation::new(
                        codes::INCOMPATIBLE_AGGREGATION,
                        Severity::Error,
                        format!(
                            "Aggregation '{}' cannot run over {} field '{}'",
                            metric.aggregation, field_type, metric.field
                        ),
                        format!("{path}/aggregation"),
                        "Use count or count_unique for non-numeric fields",
                    ));
                }
            }

            if let Some(sub) = &metric.filter {
                let sub_path = format!("{path}/filter");
                let field_type = self.resolve(
                    &sub.field,
                    format!("{sub_path}/field"),
                    codes::UNKNOWN_FIELD,
                    &format!("Sub-filter of metric '{}'", metric.id),
                );
                if let Some(field_type) = field_type {
                    if let Err(reason) = Predicate::from_value(sub.operator, field_type, &sub.value)
                    {
                        self.push(Violation::new(
                            codes::INVALID_OPERATOR,
                            Severity::Error,
                            format!("Sub-filter of metric '{}' is invalid: {reason}", metric.id),
                            sub_path,
                            "Match the operator and value to the field type",
                        ));
                    }
                }
            }

            if metric.label.is_none() {
                self.push(Violation::new(
                    codes::MISSING_LABEL,
                    Severity::Info,
                    format!("Metric '{}' has no label", metric.id),
                    format!("{path}/label"),
                    "Add a human-readable label",
                ));
            }
        }

        for (idx, component) in page.layout.components.iter().enumerate() {
            let path = format!("{base}/layout/components/{idx}");
            match component {
                Component::Visualization { visualization, .. } => {
                    self.check_visualization(visualization, &path);
                }
                Component::MetricCard { metric_id, .. } => {
                    if !metric_ids.contains(metric_id.as_str()) {
                        self.push(Violation::new(
                            codes::INVALID_REFERENCE,
                            Severity::Critical,
                            format!("Metric card references unknown metric '{metric_id}'"),
                            format!("{path}/metric_id"),
                            format!("Define a metric with id '{metric_id}' on this page or update the reference"),
                        ));
                    }
                }
                Component::Text { .. } => {}
            }
        }
    }

    fn check_visualization(&mut self, viz: &Visualization, path: &str) {
        let viz_path = format!("{path}/visualization");
        let Some(descriptor) = self.registry.descriptor(viz.chart_type) else {
            self.push(Violation::new(
                codes::UNKNOWN_CHART_TYPE,
                Severity::Critical,
                format!("Chart type '{}' is not registered", viz.chart_type),
                format!("{viz_path}/chart_type"),
                "Use a chart type known to the registry",
            ));
            return;
        };
        let descriptor = descriptor.clone();

        for role in &descriptor.required_roles {
            if !viz.roles.contains_key(role) {
                self.push(Violation::new(
                    codes::MISSING_REQUIRED_ROLE,
                    Severity::Critical,
                    format!("Chart type '{}' requires the '{role}' role", viz.chart_type),
                    format!("{viz_path}/roles"),
                    format!("Add 'roles: {{{role}: <field>}}'"),
                ));
            }
        }

        for (role, field) in &viz.roles {
            let role_path = format!("{viz_path}/roles/{role}");
            if !descriptor.accepts_role(*role) {
                self.push(Violation::new(
                    codes::UNUSED_ROLE,
                    Severity::Warning,
                    format!("Chart type '{}' ignores the '{role}' role", viz.chart_type),
                    role_path.clone(),
                    format!("Remove the '{role}' role"),
                ));
            }
            self.resolve(
                field,
                role_path,
                codes::UNKNOWN_FIELD,
                &format!("Role '{role}'"),
            );
        }

        for (name, value) in &viz.params {
            let param_path = format!("{viz_path}/params/{}", pointer_segment(name));
            match descriptor.param_spec(name) {
                None => {
                    let known: Vec<&str> = descriptor.params.iter().map(|p| p.name).collect();
                    self.push(Violation::new(
                        codes::UNKNOWN_PARAMETER,
                        Severity::Error,
                        format!("Chart type '{}' has no parameter '{name}'", viz.chart_type),
                        param_path,
                        format!("Use one of: {}", known.join(", ")),
                    ));
                }
                Some(spec) => {
                    if let Err(expected) = spec.kind.check(value) {
                        self.push(Violation::new(
                            codes::INVALID_PARAMETER,
                            Severity::Error,
                            format!("Parameter '{name}' has invalid value {value}"),
                            param_path,
                            format!("Use {expected}"),
                        ));
                    }
                }
            }
        }
    }

    fn check_data_source(&mut self, spec: &Spec) {
        let source = &spec.dashboard.data_source;
        let base = "/dashboard/data_source";

        for (field, format) in &source.formatting {
            let path = format!("{base}/formatting/{}", pointer_segment(field));
            if self.resolve_fields && !self.catalog.contains(field) {
                self.push(Violation::new(
                    codes::UNKNOWN_FORMAT_FIELD,
                    Severity::Warning,
                    format!("Formatting is declared for unknown field '{field}'"),
                    path.clone(),
                    format!("Remove the entry or add '{field}' to the schema"),
                ));
            }
            self.check_format(format, Some(field), &path);
        }
        if let Some(format) = &source.default_formatting {
            self.check_format(format, None, &format!("{base}/default_formatting"));
        }

        if let Some(code) = spec
            .dashboard
            .metadata
            .as_ref()
            .and_then(|m| m.currency.as_deref())
        {
            self.check_currency(code, "/dashboard/metadata/currency");
        }

        for field in source.column_labels.keys() {
            if self.resolve_fields && !self.catalog.contains(field) {
                self.push(Violation::new(
                    codes::UNKNOWN_LABEL_FIELD,
                    Severity::Warning,
                    format!("Column label is declared for unknown field '{field}'"),
                    format!("{base}/column_labels/{}", pointer_segment(field)),
                    format!("Remove the label or add '{field}' to the schema"),
                ));
            }
        }

        if let Some(dq) = &source.data_quality {
            self.check_data_quality(dq, &format!("{base}/data_quality"));
        }
    }

    fn check_format(&mut self, format: &FieldFormat, field: Option<&String>, path: &str) {
        let (min, max) = PRECISION_RANGE;
        if let Some(precision) = format.precision {
            if !(min..=max).contains(&precision) {
                let value = precision.clamp(min, max);
                self.push(
                    Violation::new(
                        codes::PRECISION_OUT_OF_RANGE,
                        Severity::Error,
                        format!("Precision {precision} is outside [{min}, {max}]"),
                        format!("{path}/precision"),
                        format!("Use a precision between {min} and {max}"),
                    )
                    .with_fix(Fix::ClampPrecision {
                        field: field.cloned(),
                        value,
                    }),
                );
            }
        }
        if let Some(code) = &format.currency_code {
            self.check_currency(code, &format!("{path}/currency_code"));
        }
    }

    fn check_currency(&mut self, code: &str, path: &str) {
        if currency_symbol(code).is_none() {
            self.push(Violation::new(
                codes::UNKNOWN_CURRENCY,
                Severity::Info,
                format!("Currency '{code}' has no known symbol; the code itself is shown"),
                path,
                "Use an ISO 4217 code such as USD, EUR or GBP",
            ));
        }
    }

    fn check_data_quality(&mut self, dq: &DataQualityBlock, base: &str) {
        if let Some(rule) = &dq.missing_values {
            let path = format!("{base}/missing_values");
            if rule.strategy == MissingValueStrategy::FillValue && rule.fill_value.is_none() {
                self.push(Violation::new(
                    codes::DQ_INVALID_PARAMETER,
                    Severity::Error,
                    "Strategy fill_value needs a fill_value",
                    format!("{path}/fill_value"),
                    "Add 'fill_value: <literal>'",
                ));
            }
            if let Some(fraction) = rule.max_missing_fraction {
                if !(0.0..=1.0).contains(&fraction) {
                    self.push(Violation::new(
                        codes::DQ_INVALID_PARAMETER,
                        Severity::Error,
                        format!("max_missing_fraction {fraction} is outside [0, 1]"),
                        format!("{path}/max_missing_fraction"),
                        "Use a fraction between 0 and 1",
                    ));
                }
            }
            for (idx, field) in rule.fields.iter().flatten().enumerate() {
                let field_path = format!("{path}/fields/{idx}");
                let field_type = self.resolve(
                    field,
                    field_path.clone(),
                    codes::DQ_FIELD_NOT_IN_SCHEMA,
                    "Missing-value rule",
                );
                let needs_numeric = matches!(
                    rule.strategy,
                    MissingValueStrategy::FillMean
                        | MissingValueStrategy::FillMedian
                        | MissingValueStrategy::Interpolate
                );
                if let Some(field_type) = field_type {
                    if needs_numeric && !field_type.is_numeric() {
                        self.push(Violation::new(
                            codes::FILL_STRATEGY_TYPE_MISMATCH,
                            Severity::Warning,
                            format!(
                                "Strategy {} cannot fill {} field '{field}'; it will be skipped",
                                rule.strategy, field_type
                            ),
                            field_path,
                            "Use fill_mode or fill_value for non-numeric fields",
                        ));
                    }
                }
            }
        }

        if let Some(rule) = &dq.duplicates {
            for (idx, field) in rule.subset.iter().flatten().enumerate() {
                self.resolve(
                    field,
                    format!("{base}/duplicates/subset/{idx}"),
                    codes::DQ_FIELD_NOT_IN_SCHEMA,
                    "Duplicate rule",
                );
            }
        }

        for (idx, rule) in dq.validation.iter().flat_map(|v| &v.rules).enumerate() {
            self.check_validation_rule(rule, &format!("{base}/validation/rules/{idx}"));
        }

        let Some(outliers) = dq.outliers.as_ref().filter(|o| o.enabled) else {
            return;
        };
        for (rule_idx, rule) in outliers.rules.iter().enumerate() {
            let path = format!("{base}/outliers/rules/{rule_idx}");
            let invalid = |message: String, at: &str| {
                Violation::new(
                    codes::DQ_INVALID_PARAMETER,
                    Severity::Error,
                    message,
                    format!("{path}/{at}"),
                    format!("Fix the {} parameters", rule.method),
                )
            };
            let mut params = Vec::new();

            if rule.fields.is_empty() {
                params.push(invalid("Outlier rule lists no fields".to_string(), "fields"));
            }
            let lower = rule.lower.unwrap_or(1.0);
            let upper = rule.upper.unwrap_or(99.0);
            if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) || lower >= upper
            {
                params.push(invalid(
                    format!("Percentile bounds [{lower}, {upper}] must satisfy 0 <= lower < upper <= 100"),
                    "lower",
                ));
            }
            if let Some(threshold) = rule.threshold {
                if threshold <= 0.0 || !threshold.is_finite() {
                    params.push(invalid(
                        format!("Threshold {threshold} must be a positive number"),
                        "threshold",
                    ));
                }
            }
            if let Some(contamination) = rule.contamination {
                if contamination <= 0.0 || contamination > 0.5 {
                    params.push(invalid(
                        format!("Contamination {contamination} must be in (0, 0.5]"),
                        "contamination",
                    ));
                }
            }
            self.out.extend(params);

            for (field_idx, field) in rule.fields.iter().enumerate() {
                let field_path = format!("{path}/fields/{field_idx}");
                let Some(field_type) = self.resolve(
                    field,
                    field_path.clone(),
                    codes::DQ_FIELD_NOT_IN_SCHEMA,
                    "Outlier rule",
                ) else {
                    continue;
                };
                let fix = Fix::DropOutlierField {
                    rule_index: rule_idx,
                    field: field.clone(),
                };
                if !field_type.is_numeric() {
                    self.push(
                        Violation::new(
                            codes::DQ_INAPPROPRIATE_METHOD,
                            Severity::Warning,
                            format!(
                                "Outlier detection ({}) on {} field '{field}' is not meaningful",
                                rule.method, field_type
                            ),
                            field_path,
                            format!("Remove '{field}' from the outlier rule"),
                        )
                        .with_fix(fix),
                    );
                } else if field_type == FieldType::Integer && looks_temporal(field) {
                    let method = if rule.method == OutlierMethod::IsolationForest {
                        "isolation forest"
                    } else {
                        rule.method.as_str()
                    };
                    self.push(
                        Violation::new(
                            codes::DQ_QUESTIONABLE_METHOD,
                            Severity::Warning,
                            format!(
                                "Outlier detection ({method}) on discrete temporal field '{field}' is questionable"
                            ),
                            field_path,
                            format!("Consider removing '{field}'; calendar components rarely have outliers"),
                        )
                        .with_fix(fix),
                    );
                }
            }
        }
    }

    fn check_validation_rule(&mut self, rule: &ValidationRule, path: &str) {
        let field = rule.field.as_str();
        let field_type = self.catalog.get(field);
        if self.resolve_fields && field_type.is_none() {
            let repair = format!(
                "Use a field from the dataset schema ({}) or add '{field}' to it",
                self.available_fields()
            );
            self.push(Violation::new(
                codes::DQ_FIELD_NOT_IN_SCHEMA,
                Severity::Critical,
                format!("Data quality validation rule references field '{field}' not found in schema"),
                path,
                repair,
            ));
        }
        let invalid = |message: String, at: &str| {
            Violation::new(
                codes::DQ_INVALID_PARAMETER,
                Severity::Error,
                message,
                format!("{path}/{at}"),
                format!("Fix the {} constraint parameters", rule.constraint),
            )
        };

        match rule.constraint {
            ValidationConstraint::Range => {
                match (rule.min, rule.max) {
                    (None, None) => self.push(invalid(
                        "Range constraint needs min, max or both".to_string(),
                        "min",
                    )),
                    (Some(min), Some(max)) if min > max => self.push(invalid(
                        format!("Range minimum {min} is above maximum {max}"),
                        "min",
                    )),
                    _ => {}
                }
                if let Some(field_type) = field_type.filter(|t| !t.is_numeric()) {
                    self.push(Violation::new(
                        codes::DQ_INAPPROPRIATE_METHOD,
                        Severity::Error,
                        format!("Range constraint on {field_type} field '{field}' cannot be checked"),
                        format!("{path}/constraint"),
                        "Use in_set for non-numeric fields",
                    ));
                }
            }
            ValidationConstraint::InSet => match rule.values.as_deref() {
                None | Some([]) => self.push(invalid(
                    "in_set constraint lists no values".to_string(),
                    "values",
                )),
                Some(values) => {
                    if let Some(field_type) = field_type {
                        for (idx, value) in values.iter().enumerate() {
                            if let Err(reason) = Scalar::from_value(field_type, value) {
                                self.push(invalid(reason, &format!("values/{idx}")));
                            }
                        }
                    }
                }
            },
            ValidationConstraint::NotNull | ValidationConstraint::Unique => {}
        }

        if let (Some(default), Some(field_type)) = (&rule.default, field_type) {
            if let Err(reason) = Scalar::from_value(field_type, default) {
                self.push(invalid(reason, "default"));
            }
        }
    }
}
