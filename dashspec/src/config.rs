//! Engine configuration.
//!
//! Validation policy is part of the spec itself; everything else a host may
//! want to tune lives here. All types deserialize with defaults for missing
//! keys, so a partial configuration file is enough.

use crate::error::{DashSpecError, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};

/// Knobs of the data quality engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataQualityConfig {
    /// Below this many non-null values `isolation_forest` falls back to `percentile`.
    pub isolation_forest_min_rows: usize,
    pub isolation_forest_trees: usize,
    pub isolation_forest_sample_size: usize,
    /// Seed for every randomized computation; results are reproducible.
    pub random_seed: u64,
    /// Missing fraction up to which `auto` fills instead of dropping the column.
    pub auto_missing_threshold: f64,
    pub default_contamination: f64,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            isolation_forest_min_rows: 256,
            isolation_forest_trees: 100,
            isolation_forest_sample_size: 256,
            random_seed: 42,
            auto_missing_threshold: 0.5,
            default_contamination: 0.05,
        }
    }
}

impl DataQualityConfig {
    pub fn with_isolation_forest_min_rows(mut self, rows: usize) -> Self {
        self.isolation_forest_min_rows = rows;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_auto_missing_threshold(mut self, threshold: f64) -> Self {
        self.auto_missing_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_missing_threshold) {
            return Err(DashSpecError::Configuration(format!(
                "auto_missing_threshold must be in [0, 1], got {}",
                self.auto_missing_threshold
            )));
        }
        if self.default_contamination <= 0.0 || self.default_contamination > 0.5 {
            return Err(DashSpecError::Configuration(format!(
                "default_contamination must be in (0, 0.5], got {}",
                self.default_contamination
            )));
        }
        if self.isolation_forest_trees == 0 || self.isolation_forest_sample_size < 2 {
            return Err(DashSpecError::Configuration(
                "isolation forest needs at least one tree and a sample size of 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Defaults applied when formatting results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatDefaults {
    /// Shown for undefined metric values.
    pub undefined_display: String,
    /// Currency used when neither the format nor the metadata names one.
    pub default_currency: String,
    /// Fraction digits kept in raw metric values.
    pub metric_precision: u8,
}

impl Default for FormatDefaults {
    fn default() -> Self {
        Self {
            undefined_display: "-".to_string(),
            default_currency: "USD".to_string(),
            metric_precision: 3,
        }
    }
}

/// Configuration of the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_quality: DataQualityConfig,
    pub formatting: FormatDefaults,
    pub logging: LogConfig,
}

impl EngineConfig {
    pub fn with_data_quality(mut self, data_quality: DataQualityConfig) -> Self {
        self.data_quality = data_quality;
        self
    }

    pub fn with_formatting(mut self, formatting: FormatDefaults) -> Self {
        self.formatting = formatting;
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parses a YAML or JSON configuration document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)
            .map_err(|e| DashSpecError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.data_quality.validate()?;
        if self.formatting.metric_precision > 10 {
            return Err(DashSpecError::Configuration(format!(
                "metric_precision must be at most 10, got {}",
                self.formatting.metric_precision
            )));
        }
        Ok(())
    }
}
