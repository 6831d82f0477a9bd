//! The `DashSpec` facade: parse → validate → policy → compile → execute.
//!
//! ```rust
//! use dashspec::pipeline::DashSpec;
//! use dashspec::execution::ExecutionInput;
//! use dashspec::dataset::Dataset;
//! use arrow::array::{ArrayRef, Float64Array, Int64Array};
//! use std::sync::Arc;
//!
//! # fn main() -> dashspec::error::Result<()> {
//! let text = r#"
//! dsl_version: "1.3.0"
//! dashboard:
//!   id: orders
//!   title: Orders
//!   data_source: {type: csv, path: orders.csv, schema: {id: integer, amount: float}}
//!   pages:
//!     - id: main
//!       title: Main
//!       metrics:
//!         - {id: total, field: amount, aggregation: sum, label: Total}
//!       layout:
//!         type: single
//!         components:
//!           - {type: metric_card, metric_id: total}
//! "#;
//!
//! let dataset = Dataset::from_columns(vec![
//!     ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
//!     ("amount", Arc::new(Float64Array::from(vec![2.5, 4.0])) as ArrayRef),
//! ])?;
//!
//! let result = DashSpec::new().run(text, &dataset, &ExecutionInput::new())?;
//! assert_eq!(result.pages[0].metric("total").unwrap().raw_value, Some(6.5));
//! # Ok(())
//! # }
//! ```

use crate::catalog::FieldCatalog;
use crate::compiler::{CompiledPlan, Compiler};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::execution::{DashboardExecution, ExecutionEngine, ExecutionInput};
use crate::registry::ChartRegistry;
use crate::spec::{parse_yaml, Spec};
use crate::validation::{
    SchemaValidator, SemanticValidator, ValidatedSpec, ValidationOutcome, ValidationPolicy,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Entry point wiring the validators, the policy, the compiler and the
/// execution engine together.
///
/// The facade is configuration only. It can be shared between threads and
/// reused for any number of specs.
#[derive(Debug, Clone)]
pub struct DashSpec {
    schema: SchemaValidator,
    semantic: SemanticValidator,
    compiler: Compiler,
    engine: ExecutionEngine,
    policy: Option<ValidationPolicy>,
}

impl Default for DashSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl DashSpec {
    pub fn new() -> Self {
        Self {
            schema: SchemaValidator::new(),
            semantic: SemanticValidator::default(),
            compiler: Compiler::default(),
            engine: ExecutionEngine::default(),
            policy: None,
        }
    }

    /// Uses `registry` for semantic validation and compilation.
    pub fn with_registry(mut self, registry: ChartRegistry) -> Self {
        self.semantic = SemanticValidator::new(registry.clone());
        self.compiler = Compiler::new(registry).with_config(self.engine.config());
        self
    }

    /// Overrides the spec's own `validation_policy` block.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.compiler = self.compiler.with_config(&config);
        self.engine = ExecutionEngine::new(config);
        self
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Parses spec text into a tree.
    pub fn parse(&self, text: &str) -> Result<Value> {
        parse_yaml(text)
    }

    /// Validates spec text.
    ///
    /// `catalog` is the dataset schema, when known; fields declared in the
    /// spec take precedence over it.
    ///
    /// # Errors
    ///
    /// Only unparseable text is an error; every spec problem is a violation
    /// in the returned outcome.
    pub fn validate(
        &self,
        text: &str,
        catalog: Option<&FieldCatalog>,
    ) -> Result<ValidationOutcome> {
        let tree = self.parse(text)?;
        Ok(self.validate_tree(&tree, catalog).0)
    }

    /// Validates an already parsed tree, returning the outcome and the
    /// catalog the spec was checked against.
    ///
    /// Semantic checks only run on a structurally clean tree.
    #[instrument(skip_all)]
    pub fn validate_tree(
        &self,
        tree: &Value,
        catalog: Option<&FieldCatalog>,
    ) -> (ValidationOutcome, FieldCatalog) {
        let mut violations = self.schema.validate(tree);
        let spec = Spec::from_tree(tree).ok();

        let catalog = match &spec {
            Some(spec) => {
                let declared = FieldCatalog::declared(spec);
                match catalog {
                    Some(inferred) => declared.merged_with(inferred),
                    None => declared,
                }
            }
            None => catalog.cloned().unwrap_or_default(),
        };

        match &spec {
            Some(spec) if violations.is_empty() => {
                violations.extend(self.semantic.validate(spec, &catalog));
            }
            _ => debug!(
                structural = violations.len(),
                "Semantic validation skipped on a structurally invalid tree"
            ),
        }

        let policy = self
            .policy
            .clone()
            .or_else(|| spec.as_ref().and_then(|s| s.validation_policy.clone()))
            .unwrap_or_default();
        let outcome = policy.apply(spec.as_ref(), violations);

        info!(
            valid = outcome.is_valid(),
            violations = outcome.violations.len(),
            corrections = outcome.corrections.len(),
            "Spec validated"
        );
        (outcome, catalog)
    }

    /// Validates spec text and returns it only when the policy approves it.
    ///
    /// # Errors
    ///
    /// Returns [`DashSpecError::Parse`](crate::error::DashSpecError::Parse)
    /// for unparseable text and
    /// [`DashSpecError::InvalidSpec`](crate::error::DashSpecError::InvalidSpec)
    /// carrying the blocking violations otherwise.
    pub fn check(&self, text: &str, catalog: Option<&FieldCatalog>) -> Result<ValidatedSpec> {
        let tree = self.parse(text)?;
        let (outcome, catalog) = self.validate_tree(&tree, catalog);
        outcome.into_validated(catalog)
    }

    /// Validates and compiles spec text.
    pub fn compile(&self, text: &str, catalog: Option<&FieldCatalog>) -> Result<CompiledPlan> {
        let validated = self.check(text, catalog)?;
        self.compiler.compile(&validated)
    }

    /// Validates, compiles and executes spec text against `dataset`, whose
    /// schema serves as the catalog.
    #[instrument(skip_all, fields(rows = dataset.num_rows()))]
    pub fn run(
        &self,
        text: &str,
        dataset: &Dataset,
        input: &ExecutionInput,
    ) -> Result<DashboardExecution> {
        let plan = self.compile(text, Some(&dataset.inferred_catalog()))?;
        self.engine.execute(&plan, dataset, input)
    }
}
