//! Strictness, suppression and auto-correction of violations.

use super::{Fix, IdScope, Severity, ValidatedSpec, Violation};
use crate::catalog::FieldCatalog;
use crate::error::{DashSpecError, Result};
use crate::spec::{Spec, Strictness};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Policy deciding which violations are reported and whether the spec may
/// be compiled.
///
/// | strictness | passes through                                      |
/// |------------|-----------------------------------------------------|
/// | strict     | everything; warnings are always fatal               |
/// | moderate   | critical, error; warning only with `fail_on_warnings` |
/// | relaxed    | critical, error                                     |
///
/// Suppression runs after strictness filtering and removes every violation
/// whose code is listed, whatever its severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationPolicy {
    #[serde(default)]
    pub strictness: Strictness,
    #[serde(default)]
    pub auto_correct: bool,
    #[serde(default)]
    pub fail_on_warnings: bool,
    #[serde(default)]
    pub suppress_codes: BTreeSet<String>,
}

impl ValidationPolicy {
    pub fn strict() -> Self {
        Self {
            strictness: Strictness::Strict,
            ..Default::default()
        }
    }

    pub fn moderate() -> Self {
        Self::default()
    }

    pub fn relaxed() -> Self {
        Self {
            strictness: Strictness::Relaxed,
            ..Default::default()
        }
    }

    pub fn with_auto_correct(mut self, enabled: bool) -> Self {
        self.auto_correct = enabled;
        self
    }

    pub fn with_fail_on_warnings(mut self, enabled: bool) -> Self {
        self.fail_on_warnings = enabled;
        self
    }

    pub fn suppress(mut self, code: impl Into<String>) -> Self {
        self.suppress_codes.insert(code.into());
        self
    }

    /// `strict` forces `fail_on_warnings`.
    pub fn fails_on_warnings(&self) -> bool {
        self.strictness == Strictness::Strict || self.fail_on_warnings
    }

    /// Whether a violation of this severity survives strictness filtering.
    pub fn admits(&self, severity: Severity) -> bool {
        match self.strictness {
            Strictness::Strict => true,
            Strictness::Moderate => {
                severity.is_blocking() || (severity == Severity::Warning && self.fail_on_warnings)
            }
            Strictness::Relaxed => severity.is_blocking(),
        }
    }

    /// Strictness filtering followed by suppression. Pure; order is preserved.
    pub fn filter(&self, violations: &[Violation]) -> Vec<Violation> {
        violations
            .iter()
            .filter(|v| self.admits(v.severity))
            .filter(|v| !self.suppress_codes.contains(&v.code))
            .cloned()
            .collect()
    }

    /// Filters the raw violations and, when `auto_correct` is set, repairs
    /// every remaining auto-correctable one on a copy of `spec`.
    ///
    /// `spec` is `None` when the tree never made it to the typed model; no
    /// correction is possible then.
    #[instrument(skip_all, fields(raw = violations.len(), strictness = %self.strictness))]
    pub fn apply(&self, spec: Option<&Spec>, violations: Vec<Violation>) -> ValidationOutcome {
        let filtered = self.filter(&violations);
        let mut corrections = BTreeMap::new();

        let (spec, remaining) = match spec {
            Some(spec) if self.auto_correct => {
                let mut corrected = spec.clone();
                let mut remaining = Vec::with_capacity(filtered.len());
                let mut dropped_outlier_fields = false;

                for violation in filtered {
                    let applied = match &violation.fix {
                        Some(fix) if violation.auto_correctable => {
                            dropped_outlier_fields |= matches!(fix, Fix::DropOutlierField { .. });
                            apply_fix(&mut corrected, fix)
                        }
                        _ => false,
                    };
                    if applied {
                        if let Some(fix) = &violation.fix {
                            debug!(code = %violation.code, path = %violation.path, "Applied correction");
                            corrections.insert(
                                CorrectionKey::new(&violation.code, &violation.path),
                                fix.describe(),
                            );
                        }
                    } else {
                        remaining.push(violation);
                    }
                }

                if dropped_outlier_fields {
                    prune_empty_outlier_rules(&mut corrected);
                }
                (Some(corrected), remaining)
            }
            Some(spec) => (Some(spec.clone()), filtered),
            None => (None, filtered),
        };

        let outcome = ValidationOutcome {
            violations: remaining,
            corrections,
            fails_on_warnings: self.fails_on_warnings(),
            spec,
        };
        info!(
            reported = outcome.violations.len(),
            corrected = outcome.corrections.len(),
            valid = outcome.is_valid(),
            "Validation policy applied"
        );
        outcome
    }
}

fn apply_fix(spec: &mut Spec, fix: &Fix) -> bool {
    match fix {
        Fix::RenameId {
            scope,
            index,
            new_id,
        } => {
            let pages = &mut spec.dashboard.pages;
            let slot = match scope {
                IdScope::Page => pages.get_mut(*index).map(|p| &mut p.id),
                IdScope::Filter { page } => pages
                    .get_mut(*page)
                    .and_then(|p| p.filters.get_mut(*index))
                    .map(|f| &mut f.id),
                IdScope::Metric { page } => pages
                    .get_mut(*page)
                    .and_then(|p| p.metrics.get_mut(*index))
                    .map(|m| &mut m.id),
                IdScope::Component { page } => {
                    return match pages
                        .get_mut(*page)
                        .and_then(|p| p.layout.components.get_mut(*index))
                    {
                        Some(component) => {
                            component.set_id(new_id.clone());
                            true
                        }
                        None => false,
                    };
                }
            };
            match slot {
                Some(id) => {
                    *id = new_id.clone();
                    true
                }
                None => false,
            }
        }
        Fix::ClampPrecision { field, value } => {
            let source = &mut spec.dashboard.data_source;
            let format = match field {
                Some(name) => source.formatting.get_mut(name),
                None => source.default_formatting.as_mut(),
            };
            match format {
                Some(format) => {
                    format.precision = Some(*value);
                    true
                }
                None => false,
            }
        }
        Fix::DropOutlierField { rule_index, field } => {
            let rule = spec
                .dashboard
                .data_source
                .data_quality
                .as_mut()
                .and_then(|dq| dq.outliers.as_mut())
                .and_then(|outliers| outliers.rules.get_mut(*rule_index));
            match rule {
                Some(rule) if rule.fields.contains(field) => {
                    rule.fields.retain(|f| f != field);
                    true
                }
                _ => false,
            }
        }
    }
}

// Rule indices stay stable while fixes are applied; empty rules go last.
fn prune_empty_outlier_rules(spec: &mut Spec) {
    if let Some(outliers) = spec
        .dashboard
        .data_source
        .data_quality
        .as_mut()
        .and_then(|dq| dq.outliers.as_mut())
    {
        outliers.rules.retain(|rule| !rule.fields.is_empty());
    }
}

/// Key of the corrections map: the corrected violation's code and path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CorrectionKey {
    pub code: String,
    pub path: String,
}

impl CorrectionKey {
    pub fn new(code: &str, path: &str) -> Self {
        Self {
            code: code.to_string(),
            path: path.to_string(),
        }
    }
}

/// Result of running the policy: the reported violations, the applied
/// corrections, and the (possibly corrected) spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub violations: Vec<Violation>,
    pub corrections: BTreeMap<CorrectionKey, String>,
    /// Whether warnings block compilation under the policy that produced this outcome.
    pub fails_on_warnings: bool,
    spec: Option<Spec>,
}

impl ValidationOutcome {
    /// No critical or error violations remain, and no warnings when warnings are fatal.
    pub fn is_valid(&self) -> bool {
        self.violations.iter().all(|v| match v.severity {
            Severity::Critical | Severity::Error => false,
            Severity::Warning => !self.fails_on_warnings,
            Severity::Info => true,
        })
    }

    /// The spec after corrections, if the tree could be typed at all.
    pub fn spec(&self) -> Option<&Spec> {
        self.spec.as_ref()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }

    /// Converts an approved outcome into a [`ValidatedSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`DashSpecError::InvalidSpec`] carrying the reported violations
    /// when the outcome is not valid.
    pub fn into_validated(self, catalog: FieldCatalog) -> Result<ValidatedSpec> {
        if !self.is_valid() {
            return Err(DashSpecError::InvalidSpec {
                violations: self.violations,
            });
        }
        match self.spec {
            Some(spec) => Ok(ValidatedSpec::new(spec, catalog)),
            None => Err(DashSpecError::Internal(
                "validation outcome without a typed spec reported no violations".to_string(),
            )),
        }
    }
}
