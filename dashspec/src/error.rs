//! Error types for the DashSpec engine.
//!
//! Validation problems are not errors: the validators report them as
//! [`Violation`](crate::validation::Violation)s. `DashSpecError` covers the
//! remaining failure paths: text that cannot be parsed, datasets that break the
//! loader contract, specs rejected by the validation policy, and internal
//! defects in the compiler.

use crate::validation::Violation;
use thiserror::Error;

/// The main error type for the DashSpec engine.
#[derive(Error, Debug)]
pub enum DashSpecError {
    /// The spec text could not be parsed into a tree.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The validation policy rejected the spec.
    #[error("Invalid spec: {} blocking violation(s), first: {}", violations.len(), first_message(violations))]
    InvalidSpec {
        /// The filtered violation list that blocked compilation
        violations: Vec<Violation>,
    },

    /// The compiler's precondition (a validated spec) did not hold.
    ///
    /// This signals a defect in the validators, never a user error.
    #[error("Compilation defect: {0}")]
    Compilation(String),

    /// The dataset handed over by the loader breaks the dataset contract.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error when a required column is not found in the dataset.
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn first_message(violations: &[Violation]) -> &str {
    violations
        .first()
        .map(|v| v.message.as_str())
        .unwrap_or("none")
}

/// A type alias for `Result<T, DashSpecError>`.
pub type Result<T> = std::result::Result<T, DashSpecError>;

impl DashSpecError {
    /// Creates a compilation defect error.
    pub fn compilation(message: impl Into<String>) -> Self {
        Self::Compilation(message.into())
    }

    /// Creates a dataset contract error.
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset(message.into())
    }

    /// Returns the violations carried by an `InvalidSpec` error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::InvalidSpec { violations } => violations,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for DashSpecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DashSpecError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<DashSpecError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            DashSpecError::Internal(inner) => DashSpecError::Internal(format!("{msg}: {inner}")),
            other => DashSpecError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                DashSpecError::Internal(inner) => {
                    DashSpecError::Internal(format!("{msg}: {inner}"))
                }
                other => DashSpecError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
