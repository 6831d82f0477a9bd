//! Compiled plan: every reference resolved, every default materialized.
//!
//! Plans are plain immutable values. They are `Send + Sync`, compare
//! structurally, and can be shared across any number of executions.

use crate::catalog::FieldCatalog;
use crate::error::{ErrorContext, Result};
use crate::execution::selection::{Predicate, Scalar, Selection};
use crate::formatting::ResolvedFormat;
use crate::spec::{
    AggregationKind, ChartKind, ComponentKind, DataSourceKind, DuplicateAction, DuplicateKeep,
    FieldType, FilterKind, LayoutKind, MissingValueStrategy, OutlierAction, OutlierMethod, Role,
    ValidationAction, ValidationConstraint, Width,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Direct handle on a catalog field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub name: String,
    /// Position of the field in the catalog's name order.
    pub index: usize,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPlan {
    pub version: String,
    pub dashboard_id: String,
    pub title: String,
    pub description: Option<String>,
    pub source: SourcePlan,
    pub catalog: FieldCatalog,
    pub data_quality: DataQualityPlan,
    /// Resolved display format per formatted field.
    pub formats: BTreeMap<String, ResolvedFormat>,
    /// Display label of every catalog field.
    pub labels: BTreeMap<String, String>,
    /// Pages in declaration order.
    pub pages: Vec<PagePlan>,
}

impl CompiledPlan {
    pub fn page(&self, id: &str) -> Option<&PagePlan> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn label(&self, field: &str) -> Option<&str> {
        self.labels.get(field).map(String::as_str)
    }

    /// Hex SHA-256 of the plan's JSON form.
    ///
    /// Equal plans have equal fingerprints, so hosts can key caches on it.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a plan written by [`to_json`](Self::to_json).
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to read compiled plan")
    }
}

/// Loader descriptor, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePlan {
    pub kind: DataSourceKind,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePlan {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub filters: Vec<FilterPlan>,
    pub metrics: Vec<MetricPlan>,
    pub layout: LayoutKind,
    pub components: Vec<ComponentPlan>,
}

impl PagePlan {
    pub fn filter(&self, id: &str) -> Option<&FilterPlan> {
        self.filters.iter().find(|f| f.id == id)
    }

    pub fn metric(&self, id: &str) -> Option<&MetricPlan> {
        self.metrics.iter().find(|m| m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPlan {
    pub id: String,
    pub field: FieldRef,
    pub kind: FilterKind,
    pub label: String,
    /// Selection used when the caller supplies none.
    pub default: Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPlan {
    pub id: String,
    pub field: FieldRef,
    pub aggregation: AggregationKind,
    pub condition: Option<ConditionPlan>,
    pub label: String,
    pub format: ResolvedFormat,
}

/// Metric sub-filter with its field resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPlan {
    pub field: FieldRef,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlan {
    pub id: String,
    pub title: Option<String>,
    pub width: Width,
    pub body: ComponentBody,
}

impl ComponentPlan {
    pub fn kind(&self) -> ComponentKind {
        match self.body {
            ComponentBody::Visualization(_) => ComponentKind::Visualization,
            ComponentBody::Text(_) => ComponentKind::Text,
            ComponentBody::MetricCard { .. } => ComponentKind::MetricCard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentBody {
    Visualization(VisualizationPlan),
    Text(String),
    MetricCard {
        metric_id: String,
        /// Position of the metric within its page.
        metric_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPlan {
    pub chart: ChartKind,
    pub roles: BTreeMap<Role, FieldRef>,
    /// Axis label per role, with unit suffixes.
    pub role_labels: BTreeMap<Role, String>,
    pub params: BTreeMap<String, Value>,
}

/// Data quality steps, applied in the order missing → duplicates → outliers
/// → validation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityPlan {
    pub missing: Option<MissingPlan>,
    pub duplicates: Option<DuplicatePlan>,
    /// One entry per (rule, field), in declaration order.
    pub outliers: Vec<OutlierPlan>,
    pub rules: Vec<ValidationRulePlan>,
}

impl DataQualityPlan {
    pub fn is_empty(&self) -> bool {
        self.missing.is_none()
            && self.duplicates.is_none()
            && self.outliers.is_empty()
            && self.rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingPlan {
    pub strategy: MissingValueStrategy,
    pub fill_value: Option<Value>,
    pub fields: Vec<FieldRef>,
    /// `auto` drops a column whose missing fraction exceeds this.
    pub max_missing_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePlan {
    /// Columns compared; empty compares every column.
    pub subset: Vec<FieldRef>,
    pub keep: DuplicateKeep,
    pub action: DuplicateAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierPlan {
    pub field: FieldRef,
    pub method: OutlierMethod,
    pub action: OutlierAction,
    /// Percentile bounds, in percent.
    pub lower: f64,
    pub upper: f64,
    /// z-score cutoff or IQR fence multiplier.
    pub threshold: f64,
    pub contamination: f64,
}

/// Row-level validation rule with its parameters typed against the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRulePlan {
    pub field: FieldRef,
    pub constraint: ValidationConstraint,
    pub action: ValidationAction,
    /// Inclusive bounds of `range`; `None` is open.
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Allowed values of `in_set`.
    pub values: Vec<Scalar>,
    /// Replacement written by `coerce`; `None` writes null.
    pub default: Option<Scalar>,
}
