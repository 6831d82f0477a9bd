//! Prelude for commonly used types and traits in dashspec.

pub use crate::catalog::FieldCatalog;
pub use crate::compiler::{CompiledPlan, Compiler};
pub use crate::config::EngineConfig;
pub use crate::dataset::Dataset;
pub use crate::error::{DashSpecError, ErrorContext, Result};
pub use crate::execution::{DashboardExecution, ExecutionEngine, ExecutionInput, Scalar, Selection};
pub use crate::formatters::{FormatterConfig, ReportFormatter};
pub use crate::logging::LogConfig;
pub use crate::pipeline::DashSpec;
pub use crate::spec::FieldType;
pub use crate::validation::{Severity, ValidationOutcome, ValidationPolicy, Violation};
