//! Spec validation: structural checks, semantic checks and the policy layer.
//!
//! Validation never fails with an error. Both validators return a list of
//! [`Violation`]s; the [`ValidationPolicy`] is the only place that decides
//! whether compilation may proceed, and the only producer of a
//! [`ValidatedSpec`].
//!
//! ```text
//! tree ──SchemaValidator──▶ violations ─┐
//!  │                                    ├─▶ ValidationPolicy ──▶ ValidationOutcome ──▶ ValidatedSpec
//!  └─Spec──SemanticValidator──▶ violations ┘
//! ```

mod policy;
mod schema;
mod semantic;

pub use policy::{CorrectionKey, ValidationOutcome, ValidationPolicy};
pub use schema::SchemaValidator;
pub use semantic::SemanticValidator;

use crate::catalog::FieldCatalog;
use crate::spec::Spec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a violation.
///
/// Levels are ordered by impact: Critical > Error > Warning > Info.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Style suggestion; never blocks compilation.
    Info = 0,
    /// Questionable but executable; blocks only when warnings are fatal.
    Warning = 1,
    /// Structural problem; always blocks compilation.
    Error = 2,
    /// Missing required data or dangling reference; always blocks compilation.
    Critical = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Checks if this severity is at least as severe as another.
    pub fn is_at_least(&self, other: Severity) -> bool {
        *self >= other
    }

    /// Critical and error violations always block compilation.
    pub fn is_blocking(&self) -> bool {
        self.is_at_least(Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Violation codes reported by the validators.
pub mod codes {
    pub const SCHEMA_MISSING_FIELD: &str = "SCHEMA_MISSING_FIELD";
    pub const SCHEMA_TYPE_MISMATCH: &str = "SCHEMA_TYPE_MISMATCH";
    pub const SCHEMA_ENUM_MISMATCH: &str = "SCHEMA_ENUM_MISMATCH";
    pub const SCHEMA_UNKNOWN_FIELD: &str = "SCHEMA_UNKNOWN_FIELD";
    pub const SCHEMA_VIOLATION: &str = "SCHEMA_VIOLATION";
    pub const UNSUPPORTED_VERSION: &str = "UNSUPPORTED_VERSION";

    pub const MISSING_SCHEMA: &str = "MISSING_SCHEMA";
    pub const DUPLICATE_ID: &str = "DUPLICATE_ID";
    pub const UNKNOWN_FIELD: &str = "UNKNOWN_FIELD";
    pub const INVALID_REFERENCE: &str = "INVALID_REFERENCE";
    pub const MISSING_REQUIRED_ROLE: &str = "MISSING_REQUIRED_ROLE";
    pub const UNKNOWN_CHART_TYPE: &str = "UNKNOWN_CHART_TYPE";
    pub const INCOMPATIBLE_AGGREGATION: &str = "INCOMPATIBLE_AGGREGATION";
    pub const INVALID_OPERATOR: &str = "INVALID_OPERATOR";
    pub const UNKNOWN_PARAMETER: &str = "UNKNOWN_PARAMETER";
    pub const INVALID_PARAMETER: &str = "INVALID_PARAMETER";
    pub const PRECISION_OUT_OF_RANGE: &str = "PRECISION_OUT_OF_RANGE";
    pub const FILTER_DEFAULT_MISMATCH: &str = "FILTER_DEFAULT_MISMATCH";
    pub const FILTER_KIND_TYPE_MISMATCH: &str = "FILTER_KIND_TYPE_MISMATCH";

    pub const DQ_FIELD_NOT_IN_SCHEMA: &str = "DQ_FIELD_NOT_IN_SCHEMA";
    pub const DQ_INVALID_PARAMETER: &str = "DQ_INVALID_PARAMETER";
    pub const DQ_INAPPROPRIATE_METHOD: &str = "DQ_INAPPROPRIATE_METHOD";
    pub const DQ_QUESTIONABLE_METHOD: &str = "DQ_QUESTIONABLE_METHOD";
    pub const FILL_STRATEGY_TYPE_MISMATCH: &str = "FILL_STRATEGY_TYPE_MISMATCH";

    pub const UNUSED_ROLE: &str = "UNUSED_ROLE";
    pub const UNKNOWN_FORMAT_FIELD: &str = "UNKNOWN_FORMAT_FIELD";
    pub const UNKNOWN_LABEL_FIELD: &str = "UNKNOWN_LABEL_FIELD";
    pub const MISSING_LABEL: &str = "MISSING_LABEL";
    pub const UNKNOWN_CURRENCY: &str = "UNKNOWN_CURRENCY";
}

/// Collection an identifier lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdScope {
    Page,
    Filter { page: usize },
    Metric { page: usize },
    Component { page: usize },
}

/// Deterministic repair attached to an auto-correctable violation.
#[derive(Debug, Clone, PartialEq)]
pub enum Fix {
    /// Give the identifier at `index` within `scope` a new, unique value.
    RenameId {
        scope: IdScope,
        index: usize,
        new_id: String,
    },
    /// Clamp a format precision; `field == None` targets `default_formatting`.
    ClampPrecision { field: Option<String>, value: i64 },
    /// Remove a field from an outlier rule; rules left without fields are dropped.
    DropOutlierField { rule_index: usize, field: String },
}

impl Fix {
    /// Human-readable summary recorded in the corrections map.
    pub fn describe(&self) -> String {
        match self {
            Fix::RenameId { new_id, .. } => format!("renamed to '{new_id}'"),
            Fix::ClampPrecision { value, .. } => format!("precision clamped to {value}"),
            Fix::DropOutlierField { rule_index, field } => {
                format!("removed '{field}' from outlier rule {rule_index}")
            }
        }
    }
}

/// A structured report of a spec defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    /// JSON-pointer-style location, e.g. `/dashboard/pages/1/id`.
    pub path: String,
    /// How to fix the problem.
    pub repair: String,
    pub auto_correctable: bool,
    #[serde(skip)]
    pub fix: Option<Fix>,
}

impl Violation {
    pub fn new(
        code: &str,
        severity: Severity,
        message: impl Into<String>,
        path: impl Into<String>,
        repair: impl Into<String>,
    ) -> Self {
        Self {
            code: code.to_string(),
            severity,
            message: message.into(),
            path: path.into(),
            repair: repair.into(),
            auto_correctable: false,
            fix: None,
        }
    }

    /// Marks the violation auto-correctable with the given repair.
    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.auto_correctable = true;
        self.fix = Some(fix);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.severity, self.code, self.path, self.message
        )
    }
}

/// Escapes a mapping key for use as one JSON-pointer segment (RFC 6901).
pub fn pointer_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// A spec the validation policy has approved, together with the field
/// catalog it was validated against.
///
/// Only [`ValidationOutcome::into_validated`] constructs this type, so the
/// compiler cannot be handed an unchecked spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    spec: Spec,
    catalog: FieldCatalog,
}

impl ValidatedSpec {
    pub(crate) fn new(spec: Spec, catalog: FieldCatalog) -> Self {
        Self { spec, catalog }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn into_inner(self) -> (Spec, FieldCatalog) {
        (self.spec, self.catalog)
    }
}
