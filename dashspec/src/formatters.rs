//! Renderings of a validation outcome for the CLI and rendering tiers.
//!
//! Three formatters ship with the crate: [`JsonFormatter`] for programs,
//! [`HumanFormatter`] for terminals and [`MarkdownFormatter`] for reports.
//!
//! # Examples
//!
//! ```rust
//! use dashspec::formatters::{HumanFormatter, ReportFormatter};
//! use dashspec::pipeline::DashSpec;
//!
//! let outcome = DashSpec::new()
//!     .validate("dsl_version: '1.3.0'\n", None)
//!     .unwrap();
//! let text = HumanFormatter::new().format(&outcome).unwrap();
//! assert!(text.contains("SCHEMA_MISSING_FIELD"));
//! ```

use crate::error::{DashSpecError, Result};
use crate::validation::{Severity, ValidationOutcome, Violation};
use serde::Serialize;
use std::fmt::{self, Write};

/// Configuration options for rendering a validation outcome.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Show the repair hint of each violation
    pub include_repairs: bool,
    /// List the corrections the policy applied
    pub include_corrections: bool,
    /// Maximum number of violations to display; `None` shows all
    pub max_violations: Option<usize>,
    /// ANSI colors (human formatter only)
    pub use_colors: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_repairs: true,
            include_corrections: true,
            max_violations: None,
            use_colors: true,
        }
    }
}

impl FormatterConfig {
    /// Summary and violation headlines only.
    pub fn minimal() -> Self {
        Self {
            include_repairs: false,
            include_corrections: false,
            max_violations: Some(0),
            use_colors: false,
        }
    }

    /// Plain output with a bounded violation list, for CI logs.
    pub fn ci() -> Self {
        Self {
            include_repairs: true,
            include_corrections: true,
            max_violations: Some(50),
            use_colors: false,
        }
    }

    pub fn with_repairs(mut self, include: bool) -> Self {
        self.include_repairs = include;
        self
    }

    pub fn with_max_violations(mut self, max: usize) -> Self {
        self.max_violations = Some(max);
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn shown<'a>(&self, violations: &'a [Violation]) -> &'a [Violation] {
        match self.max_violations {
            Some(max) => &violations[..max.min(violations.len())],
            None => violations,
        }
    }
}

/// Renders a [`ValidationOutcome`] as text.
///
/// # Examples
///
/// ```rust
/// use dashspec::formatters::ReportFormatter;
/// use dashspec::validation::ValidationOutcome;
///
/// struct CountOnly;
///
/// impl ReportFormatter for CountOnly {
///     fn format(&self, outcome: &ValidationOutcome) -> dashspec::error::Result<String> {
///         Ok(format!("{} violation(s)", outcome.violations.len()))
///     }
/// }
/// ```
pub trait ReportFormatter {
    fn format(&self, outcome: &ValidationOutcome) -> Result<String>;

    /// Renders with explicit options; the default ignores them.
    fn format_with_config(
        &self,
        outcome: &ValidationOutcome,
        _config: &FormatterConfig,
    ) -> Result<String> {
        self.format(outcome)
    }
}

fn render_error(err: fmt::Error) -> DashSpecError {
    DashSpecError::Internal(format!("Failed to render report: {err}"))
}

/// Per-severity counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn of(outcome: &ValidationOutcome) -> Self {
        Self {
            critical: outcome.count(Severity::Critical),
            error: outcome.count(Severity::Error),
            warning: outcome.count(Severity::Warning),
            info: outcome.count(Severity::Info),
        }
    }
}

#[derive(Serialize)]
struct CorrectionRecord<'a> {
    code: &'a str,
    path: &'a str,
    applied: &'a str,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    valid: bool,
    summary: SeverityCounts,
    violations: &'a [Violation],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    corrections: Vec<CorrectionRecord<'a>>,
}

/// Structured JSON: validity, per-severity counts, violation records and
/// applied corrections.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, outcome: &ValidationOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &ValidationOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let corrections = if config.include_corrections {
            outcome
                .corrections
                .iter()
                .map(|(key, applied)| CorrectionRecord {
                    code: &key.code,
                    path: &key.path,
                    applied,
                })
                .collect()
        } else {
            Vec::new()
        };
        let report = JsonReport {
            valid: outcome.is_valid(),
            summary: SeverityCounts::of(outcome),
            violations: config.shown(&outcome.violations),
            corrections,
        };

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };
        rendered.map_err(|e| DashSpecError::Internal(format!("Failed to serialize report: {e}")))
    }
}

/// Console output, optionally colorized.
#[derive(Debug, Clone)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn severity_marker(severity: Severity, colors: bool) -> String {
        let (symbol, color) = match severity {
            Severity::Critical => ("✖", "\x1b[1;31m"),
            Severity::Error => ("✖", "\x1b[31m"),
            Severity::Warning => ("⚠", "\x1b[33m"),
            Severity::Info => ("ℹ", "\x1b[34m"),
        };
        if colors {
            format!("{color}{symbol} {severity}\x1b[0m")
        } else {
            format!("{symbol} {severity}")
        }
    }

    fn render(
        &self,
        out: &mut String,
        outcome: &ValidationOutcome,
        config: &FormatterConfig,
    ) -> fmt::Result {
        let counts = SeverityCounts::of(outcome);
        writeln!(out)?;
        match (outcome.is_valid(), config.use_colors) {
            (true, true) => writeln!(out, "\x1b[32mSpec is valid\x1b[0m")?,
            (true, false) => writeln!(out, "Spec is valid")?,
            (false, true) => writeln!(out, "\x1b[31mSpec is invalid\x1b[0m")?,
            (false, false) => writeln!(out, "Spec is invalid")?,
        }
        writeln!(
            out,
            "   critical: {}  error: {}  warning: {}  info: {}",
            counts.critical, counts.error, counts.warning, counts.info
        )?;

        let shown = config.shown(&outcome.violations);
        for (i, violation) in shown.iter().enumerate() {
            writeln!(out)?;
            writeln!(
                out,
                "   {} #{}: {}",
                Self::severity_marker(violation.severity, config.use_colors),
                i + 1,
                violation.code
            )?;
            writeln!(out, "      at {}", violation.path)?;
            writeln!(out, "      {}", violation.message)?;
            if config.include_repairs {
                writeln!(out, "      fix: {}", violation.repair)?;
            }
        }
        if outcome.violations.len() > shown.len() {
            writeln!(out)?;
            writeln!(
                out,
                "   ... and {} more violation(s)",
                outcome.violations.len() - shown.len()
            )?;
        }

        if config.include_corrections && !outcome.corrections.is_empty() {
            writeln!(out)?;
            writeln!(out, "   Applied corrections:")?;
            for (key, applied) in &outcome.corrections {
                writeln!(out, "      {} at {}: {applied}", key.code, key.path)?;
            }
        }
        writeln!(out)
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for HumanFormatter {
    fn format(&self, outcome: &ValidationOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &ValidationOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut out = String::new();
        self.render(&mut out, outcome, config).map_err(render_error)?;
        Ok(out)
    }
}

/// Markdown with a summary table and one row per violation.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the base heading level, clamped to 1..=6.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }

    fn render(
        &self,
        out: &mut String,
        outcome: &ValidationOutcome,
        config: &FormatterConfig,
    ) -> fmt::Result {
        let h = "#".repeat(usize::from(self.heading_level));
        let counts = SeverityCounts::of(outcome);
        let verdict = if outcome.is_valid() { "VALID" } else { "INVALID" };

        writeln!(out, "{h} Spec Validation - {verdict}")?;
        writeln!(out)?;
        writeln!(out, "| Severity | Count |")?;
        writeln!(out, "|----------|-------|")?;
        writeln!(out, "| critical | {} |", counts.critical)?;
        writeln!(out, "| error | {} |", counts.error)?;
        writeln!(out, "| warning | {} |", counts.warning)?;
        writeln!(out, "| info | {} |", counts.info)?;

        let shown = config.shown(&outcome.violations);
        if !shown.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h}# Violations")?;
            writeln!(out)?;
            if config.include_repairs {
                writeln!(out, "| Severity | Code | Path | Message | Repair |")?;
                writeln!(out, "|----------|------|------|---------|--------|")?;
            } else {
                writeln!(out, "| Severity | Code | Path | Message |")?;
                writeln!(out, "|----------|------|------|---------|")?;
            }
            for v in shown {
                write!(
                    out,
                    "| {} | `{}` | `{}` | {} |",
                    v.severity,
                    v.code,
                    v.path,
                    escape_cell(&v.message)
                )?;
                if config.include_repairs {
                    write!(out, " {} |", escape_cell(&v.repair))?;
                }
                writeln!(out)?;
            }
            if outcome.violations.len() > shown.len() {
                writeln!(out)?;
                writeln!(
                    out,
                    "> **Note:** {} additional violation(s) not shown.",
                    outcome.violations.len() - shown.len()
                )?;
            }
        }

        if config.include_corrections && !outcome.corrections.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h}# Corrections")?;
            writeln!(out)?;
            for (key, applied) in &outcome.corrections {
                writeln!(out, "- `{}` at `{}`: {}", key.code, key.path, escape_cell(applied))?;
            }
        }
        Ok(())
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, outcome: &ValidationOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &ValidationOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut out = String::new();
        self.render(&mut out, outcome, config).map_err(render_error)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DashSpec;
    use crate::test_fixtures::SCENARIO_A_SPEC;
    use crate::validation::{codes, ValidationPolicy};

    fn invalid_outcome() -> ValidationOutcome {
        let text = SCENARIO_A_SPEC
            .replace("field: transaction_id", "field: txn")
            .replace("label: Amount\n", "");
        DashSpec::new()
            .with_policy(ValidationPolicy::strict())
            .validate(&text, None)
            .unwrap()
    }

    fn corrected_outcome() -> ValidationOutcome {
        let duplicated = SCENARIO_A_SPEC.replace(
            "  pages:\n",
            "  pages:\n    - id: overview\n      title: Copy\n      layout: {type: single, components: [{type: text, text: hi}]}\n",
        );
        DashSpec::new()
            .with_policy(ValidationPolicy::moderate().with_auto_correct(true))
            .validate(&duplicated, None)
            .unwrap()
    }

    #[test]
    fn test_formatter_config() {
        let config = FormatterConfig::default();
        assert!(config.include_repairs);
        assert!(config.use_colors);
        assert_eq!(config.max_violations, None);

        let minimal = FormatterConfig::minimal();
        assert!(!minimal.include_repairs);
        assert_eq!(minimal.max_violations, Some(0));

        let ci = FormatterConfig::ci();
        assert!(!ci.use_colors);
        assert_eq!(ci.max_violations, Some(50));
    }

    #[test]
    fn test_json_formatter() {
        let outcome = invalid_outcome();
        let output = JsonFormatter::new().format(&outcome).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["summary"]["critical"], 1);
        assert_eq!(json["summary"]["info"], 1);
        // filters are checked before metrics
        assert_eq!(json["violations"][0]["code"], codes::MISSING_LABEL);
        assert_eq!(json["violations"][1]["code"], codes::UNKNOWN_FIELD);
        assert_eq!(json["violations"][1]["severity"], "critical");
        assert!(json.get("corrections").is_none());

        let compact = JsonFormatter::new()
            .with_pretty(false)
            .format_with_config(&outcome, &FormatterConfig::minimal())
            .unwrap();
        assert!(compact.contains("\"violations\":[]"));
    }

    #[test]
    fn test_json_lists_corrections() {
        let output = JsonFormatter::new().format(&corrected_outcome()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["corrections"][0]["code"], codes::DUPLICATE_ID);
        assert_eq!(json["corrections"][0]["applied"], "renamed to 'overview_1'");
    }

    #[test]
    fn test_human_formatter() {
        let outcome = invalid_outcome();
        let output = HumanFormatter::new().format(&outcome).unwrap();
        assert!(output.contains("Spec is invalid"));
        assert!(output.contains("UNKNOWN_FIELD"));
        assert!(output.contains("/dashboard/pages/0/metrics/0/field"));

        let plain = FormatterConfig::default().with_colors(false);
        let output = HumanFormatter::new()
            .format_with_config(&outcome, &plain)
            .unwrap();
        assert!(!output.contains("\x1b["));
        assert!(output.contains("fix: "));
    }

    #[test]
    fn test_human_truncates() {
        let config = FormatterConfig::default()
            .with_colors(false)
            .with_max_violations(1);
        let output = HumanFormatter::with_config(config)
            .format(&invalid_outcome())
            .unwrap();
        assert!(output.contains("#1"));
        assert!(!output.contains("#2"));
        assert!(output.contains("... and 1 more violation(s)"));
    }

    #[test]
    fn test_markdown_formatter() {
        let outcome = invalid_outcome();
        let output = MarkdownFormatter::new().format(&outcome).unwrap();
        assert!(output.contains("## Spec Validation - INVALID"));
        assert!(output.contains("| critical | 1 |"));
        assert!(output.contains("### Violations"));
        assert!(output.contains("`UNKNOWN_FIELD`"));

        let output = MarkdownFormatter::new()
            .with_heading_level(1)
            .format(&corrected_outcome())
            .unwrap();
        assert!(output.starts_with("# Spec Validation - VALID"));
        assert!(output.contains("# Corrections"));
    }

    #[test]
    fn test_cells_are_escaped() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
    }
}
