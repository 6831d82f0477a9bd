//! Typed spec model.
//!
//! The model is closed: every struct rejects unknown keys and every
//! string-valued token is one of the enums in [`super::kinds`]. A `Spec` is
//! produced once from a structurally valid tree and is never mutated in place;
//! auto-corrections build a new value.

use super::kinds::*;
use crate::validation::ValidationPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Root document of a dashboard specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    /// Language version, e.g. `1.3.0`.
    #[serde(rename = "dsl_version")]
    pub version: String,
    pub dashboard: Dashboard,
    /// Policy embedded in the spec; callers may override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_policy: Option<ValidationPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dashboard {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub pages: Vec<Page>,
}

/// Descriptor handed to the external loader, plus per-field presentation and
/// data-quality configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub kind: DataSourceKind,
    pub path: String,
    /// Declared field types. May be empty when the host supplies an inferred catalog.
    #[serde(default)]
    pub schema: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub formatting: BTreeMap<String, FieldFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_formatting: Option<FieldFormat>,
    #[serde(default)]
    pub column_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQualityBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// ISO 4217 code used by `currency` formats without their own code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

/// Display format of a field as written in the spec.
///
/// `precision` is kept signed so out-of-range values survive deserialization
/// and can be reported (and clamped) by the semantic validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldFormat {
    #[serde(rename = "type")]
    pub kind: FormatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_thousands_separator: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
}

impl FieldFormat {
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            precision: None,
            use_thousands_separator: None,
            currency_code: None,
        }
    }

    pub fn with_precision(mut self, precision: i64) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Overlays `self` on a default format; fields set here win.
    pub fn merged_over(&self, default: &FieldFormat) -> FieldFormat {
        FieldFormat {
            kind: self.kind,
            precision: self.precision.or(default.precision),
            use_thousands_separator: self
                .use_thousands_separator
                .or(default.use_thousands_separator),
            currency_code: self
                .currency_code
                .clone()
                .or_else(|| default.currency_code.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Page {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub id: String,
    pub field: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Raw default; its shape is checked against `kind` by the semantic validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    pub id: String,
    pub field: String,
    pub aggregation: AggregationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetricFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,
}

/// Row restriction applied to a single metric after the page filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricFilter {
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    #[serde(rename = "type")]
    pub kind: LayoutKind,
    pub components: Vec<Component>,
}

/// A layout slot, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Component {
    Visualization {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<Width>,
        visualization: Visualization,
    },
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<Width>,
        text: String,
    },
    MetricCard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<Width>,
        metric_id: String,
    },
}

impl Component {
    pub fn id(&self) -> Option<&str> {
        match self {
            Component::Visualization { id, .. }
            | Component::Text { id, .. }
            | Component::MetricCard { id, .. } => id.as_deref(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Component::Visualization { title, .. }
            | Component::Text { title, .. }
            | Component::MetricCard { title, .. } => title.as_deref(),
        }
    }

    pub fn width(&self) -> Option<Width> {
        match self {
            Component::Visualization { width, .. }
            | Component::Text { width, .. }
            | Component::MetricCard { width, .. } => *width,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Visualization { .. } => ComponentKind::Visualization,
            Component::Text { .. } => ComponentKind::Text,
            Component::MetricCard { .. } => ComponentKind::MetricCard,
        }
    }

    pub(crate) fn set_id(&mut self, new_id: String) {
        match self {
            Component::Visualization { id, .. }
            | Component::Text { id, .. }
            | Component::MetricCard { id, .. } => *id = Some(new_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Visualization {
    pub chart_type: ChartKind,
    #[serde(default)]
    pub roles: BTreeMap<Role, String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataQualityBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_values: Option<MissingValueRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<DuplicateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissingValueRule {
    pub strategy: MissingValueStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<Value>,
    /// Fields covered by the rule; `None` covers every catalog field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Upper missing fraction for which `auto` still fills instead of dropping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_missing_fraction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuplicateRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<Vec<String>>,
    #[serde(default = "default_keep")]
    pub keep: DuplicateKeep,
    #[serde(default = "default_duplicate_action")]
    pub action: DuplicateAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlierBlock {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<OutlierRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlierRule {
    pub fields: Vec<String>,
    pub method: OutlierMethod,
    pub action: OutlierAction,
    /// Lower percentile bound, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    /// Upper percentile bound, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    /// Deviation threshold for `zscore`, fence multiplier for `iqr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Expected outlier share for `isolation_forest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contamination: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationBlock {
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

/// Row-level constraint on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationRule {
    pub field: String,
    pub constraint: ValidationConstraint,
    #[serde(default)]
    pub action: ValidationAction,
    /// Inclusive lower bound for `range`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for `range`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Allowed values for `in_set`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    /// Replacement written by `coerce`; absent means null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_true() -> bool {
    true
}

fn default_keep() -> DuplicateKeep {
    DuplicateKeep::First
}

fn default_duplicate_action() -> DuplicateAction {
    DuplicateAction::Drop
}
