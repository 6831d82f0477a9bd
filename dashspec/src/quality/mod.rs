//! Data Quality Engine.
//!
//! Applies a compiled [`DataQualityPlan`] to a dataset in four steps:
//! missing values, then duplicate rows, then outlier rules and finally
//! validation rules, each in declaration order. Every step records what it
//! did in a [`DqLogEntry`].
//!
//! Statistical edge cases never fail the run. An empty dataset, a single
//! row, a constant column or a too-small sample for the isolation forest all
//! produce a log entry marked `degraded` and leave the data as it was (or
//! fall back to a simpler method).
//!
//! ```rust
//! use arrow::array::{ArrayRef, Float64Array};
//! use dashspec::compiler::DataQualityPlan;
//! use dashspec::config::DataQualityConfig;
//! use dashspec::dataset::Dataset;
//! use dashspec::quality::DataQualityEngine;
//! use std::sync::Arc;
//!
//! # fn example() -> dashspec::error::Result<()> {
//! let amounts: ArrayRef = Arc::new(Float64Array::from(vec![10.0, 50.0, 150.0]));
//! let dataset = Dataset::from_columns(vec![("amount", amounts)])?;
//!
//! let engine = DataQualityEngine::new(DataQualityConfig::default());
//! let outcome = engine.apply(&dataset, &DataQualityPlan::default())?;
//! assert!(outcome.log.is_empty());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod duplicates;
pub mod missing;
pub mod outliers;
pub mod rules;
pub mod stats;

pub use duplicates::DUPLICATE_FLAG_COLUMN;
pub use missing::{MISSING_FLAG_SUFFIX, UNKNOWN_SENTINEL};
pub use outliers::{
    Detection, IqrDetector, IsolationForestDetector, OutlierDetector, PercentileDetector,
    ZScoreDetector,
};
pub use rules::INVALID_FLAG_SUFFIX;

use crate::compiler::{DataQualityPlan, OutlierPlan};
use crate::config::DataQualityConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::log_dq;
use crate::logging::{truncate_field, LogConfig};
use crate::spec::{FieldType, OutlierAction, OutlierMethod};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Suffix of the column added by the outlier `flag` action.
pub const OUTLIER_FLAG_SUFFIX: &str = "_outlier_flag";

/// One applied (or skipped) data quality action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DqLogEntry {
    /// Affected field, comma-separated fields, or `*` for the whole dataset.
    pub field: String,
    pub method: String,
    pub action: String,
    pub rows_affected: usize,
    pub message: String,
    /// The step could not run as configured.
    pub degraded: bool,
}

impl DqLogEntry {
    pub fn applied(
        field: impl Into<String>,
        method: &str,
        action: &str,
        rows_affected: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            method: method.to_string(),
            action: action.to_string(),
            rows_affected,
            message: message.into(),
            degraded: false,
        }
    }

    pub fn degraded(
        field: impl Into<String>,
        method: &str,
        action: &str,
        rows_affected: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            degraded: true,
            ..Self::applied(field, method, action, rows_affected, message)
        }
    }
}

/// Transformed dataset plus the log of what happened to it.
#[derive(Debug, Clone)]
pub struct DqOutcome {
    pub dataset: Dataset,
    pub log: Vec<DqLogEntry>,
}

impl DqOutcome {
    pub fn degradations(&self) -> impl Iterator<Item = &DqLogEntry> {
        self.log.iter().filter(|entry| entry.degraded)
    }
}

/// Runs data quality plans. Holds configuration only; safe to share between threads.
#[derive(Debug, Clone, Default)]
pub struct DataQualityEngine {
    config: DataQualityConfig,
    log_config: LogConfig,
}

impl DataQualityEngine {
    pub fn new(config: DataQualityConfig) -> Self {
        Self {
            config,
            log_config: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn config(&self) -> &DataQualityConfig {
        &self.config
    }

    /// Applies `plan` to `dataset`.
    ///
    /// # Errors
    ///
    /// Only Arrow kernel failures propagate; data shape problems are logged.
    #[instrument(
        skip_all,
        fields(
            rows = dataset.num_rows(),
            outlier_rules = plan.outliers.len(),
            validation_rules = plan.rules.len()
        )
    )]
    pub fn apply(&self, dataset: &Dataset, plan: &DataQualityPlan) -> Result<DqOutcome> {
        let mut log = Vec::new();
        if plan.is_empty() {
            return Ok(DqOutcome {
                dataset: dataset.clone(),
                log,
            });
        }
        if dataset.is_empty() {
            warn!("Dataset is empty, data quality rules skipped");
            log.push(DqLogEntry::degraded(
                "*",
                "data_quality",
                "skip",
                0,
                "dataset is empty, no rules applied",
            ));
            return Ok(DqOutcome {
                dataset: dataset.clone(),
                log,
            });
        }

        let mut current = dataset.clone();
        if let Some(missing) = &plan.missing {
            current = missing::apply(&current, missing, &mut log)?;
        }
        if let Some(duplicates) = &plan.duplicates {
            current = duplicates::apply(&current, duplicates, &mut log)?;
        }
        for rule in &plan.outliers {
            current = self.apply_outlier_rule(&current, rule, &mut log)?;
        }
        for rule in &plan.rules {
            current = rules::apply(&current, rule, &mut log)?;
        }

        let max = self.log_config.max_field_length;
        for entry in &log {
            if entry.degraded {
                warn!(
                    field = %truncate_field(&entry.field, max),
                    method = %entry.method,
                    "Data quality step degraded: {}",
                    truncate_field(&entry.message, max)
                );
            } else {
                log_dq!(
                    self.log_config,
                    field = %truncate_field(&entry.field, max),
                    method = %entry.method,
                    action = %entry.action,
                    rows_affected = entry.rows_affected,
                    "Data quality step applied"
                );
            }
        }

        Ok(DqOutcome {
            dataset: current,
            log,
        })
    }

    /// Detector for a rule; `isolation_forest` below the row minimum falls back
    /// to `percentile` and says so in the returned note.
    fn detector(
        &self,
        rule: &OutlierPlan,
        available: usize,
    ) -> (Box<dyn OutlierDetector>, Option<String>) {
        let percentile = || -> Box<dyn OutlierDetector> {
            Box::new(PercentileDetector::new(rule.lower, rule.upper))
        };
        let detector: Box<dyn OutlierDetector> = match rule.method {
            OutlierMethod::Percentile => percentile(),
            OutlierMethod::Zscore => Box::new(ZScoreDetector::new(rule.threshold)),
            OutlierMethod::Iqr => Box::new(IqrDetector::new(rule.threshold)),
            OutlierMethod::IsolationForest if available < self.config.isolation_forest_min_rows => {
                let note = format!(
                    "isolation_forest needs {} values, got {available}; used percentile {}-{}",
                    self.config.isolation_forest_min_rows, rule.lower, rule.upper
                );
                return (percentile(), Some(note));
            }
            OutlierMethod::IsolationForest => Box::new(
                IsolationForestDetector::new(rule.contamination)
                    .with_trees(self.config.isolation_forest_trees)
                    .with_sample_size(self.config.isolation_forest_sample_size)
                    .with_seed(self.config.random_seed),
            ),
        };
        (detector, None)
    }

    fn apply_outlier_rule(
        &self,
        dataset: &Dataset,
        rule: &OutlierPlan,
        log: &mut Vec<DqLogEntry>,
    ) -> Result<Dataset> {
        let name = rule.field.name.as_str();
        let method = rule.method.as_str();
        let action = rule.action.as_str();

        let Some(column) = dataset.column(name) else {
            log.push(DqLogEntry::degraded(
                name,
                method,
                action,
                0,
                "column not in dataset, skipped",
            ));
            return Ok(dataset.clone());
        };
        let Some(values) = column.numeric_values() else {
            log.push(DqLogEntry::degraded(
                name,
                method,
                action,
                0,
                format!("{} field is not numeric, skipped", column.field_type()),
            ));
            return Ok(dataset.clone());
        };

        // non-finite values read as missing and are never outliers
        let present: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(row, value)| value.map(|v| (row, v)))
            .collect();
        let sample: Vec<f64> = present.iter().map(|(_, v)| *v).collect();

        let (detector, fallback) = self.detector(rule, sample.len());
        let detection = detector.detect(&sample);
        let (Some(mask), Some((lower, upper))) = (detection.mask(&sample), detection.bounds()) else {
            let reason = match detection {
                Detection::Skipped { reason } => reason,
                _ => "detector gave no verdict".to_string(),
            };
            log.push(DqLogEntry::degraded(
                name,
                detector.name(),
                action,
                0,
                format!("{reason}, field left unchanged"),
            ));
            return Ok(dataset.clone());
        };

        let rows = dataset.num_rows();
        let mut outlier = vec![false; rows];
        for ((row, _), flagged) in present.iter().zip(mask) {
            outlier[*row] = flagged;
        }
        let detected = outlier.iter().filter(|o| **o).count();

        let (result, affected) = match rule.action {
            OutlierAction::Cap => {
                // raw values, so non-finite cells come back untouched
                let raw: Vec<Option<f64>> = (0..rows).map(|row| column.f64_at(row)).collect();
                let (capped, changed) = cap(&raw, &outlier, lower, upper, column.field_type());
                (dataset.with_column(name, capped)?, changed)
            }
            OutlierAction::Remove => {
                let keep: Vec<bool> = outlier.iter().map(|o| !o).collect();
                (dataset.filter_rows(&keep)?, detected)
            }
            OutlierAction::Flag => {
                let flag_name = format!("{name}{OUTLIER_FLAG_SUFFIX}");
                // a second rule on the same field adds to the existing flags
                if let Some(existing) = dataset.column(&flag_name) {
                    for (row, flagged) in outlier.iter_mut().enumerate() {
                        *flagged |= existing.key_at(row).as_deref() == Some("true");
                    }
                }
                let flags: ArrayRef = Arc::new(BooleanArray::from(outlier));
                (dataset.with_column(&flag_name, flags)?, detected)
            }
        };

        let bounds = format!("bounds [{lower:.4}, {upper:.4}]");
        let entry = match fallback {
            Some(note) => DqLogEntry::degraded(
                name,
                detector.name(),
                action,
                affected,
                format!("{note}; {bounds}"),
            ),
            None => DqLogEntry::applied(
                name,
                detector.name(),
                action,
                affected,
                format!("{detected} outlier(s), {bounds}"),
            ),
        };
        log.push(entry);
        Ok(result)
    }
}

/// Clamps flagged values into `[lower, upper]`; integer columns clamp to the
/// whole numbers inside the bounds.
fn cap(
    values: &[Option<f64>],
    outlier: &[bool],
    lower: f64,
    upper: f64,
    field_type: FieldType,
) -> (ArrayRef, usize) {
    let (lower, upper) = if field_type == FieldType::Integer {
        let (lo, hi) = (lower.ceil(), upper.floor());
        if lo <= hi {
            (lo, hi)
        } else {
            (lower.round(), lower.round())
        }
    } else {
        (lower, upper)
    };

    let mut changed = 0;
    let capped: Vec<Option<f64>> = values
        .iter()
        .zip(outlier)
        .map(|(value, flagged)| {
            value.map(|v| {
                if *flagged {
                    let clamped = v.clamp(lower, upper);
                    if clamped != v {
                        changed += 1;
                    }
                    clamped
                } else {
                    v
                }
            })
        })
        .collect();

    let array: ArrayRef = match field_type {
        FieldType::Integer => Arc::new(
            capped
                .iter()
                .map(|v| v.map(|v| v as i64))
                .collect::<Int64Array>(),
        ),
        _ => Arc::new(Float64Array::from(capped)),
    };
    (array, changed)
}
