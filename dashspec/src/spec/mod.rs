//! Spec language: text front-end, enumerated vocabulary and typed model.
//!
//! ```text
//! spec text --parse_yaml--> tree (serde_json::Value) --Spec::from_tree--> Spec
//! ```
//!
//! The tree is what the [schema validator](crate::validation::SchemaValidator)
//! inspects; the typed [`Spec`] is what everything after it consumes.

pub mod kinds;
mod model;

pub use kinds::*;
pub use model::{
    Component, DataQualityBlock, DataSource, Dashboard, DuplicateRule, FieldFormat, Filter,
    Layout, Metadata, Metric, MetricFilter, MissingValueRule, OutlierBlock, OutlierRule, Page,
    Spec, ValidationBlock, ValidationRule, Visualization,
};

use crate::error::{DashSpecError, Result};
use serde_json::Value;

/// Parses YAML spec text into a tree of mappings, sequences and scalars.
///
/// # Errors
///
/// Returns [`DashSpecError::Parse`] when the text is not YAML or its root is
/// not a mapping.
pub fn parse_yaml(text: &str) -> Result<Value> {
    let tree: Value = serde_yaml::from_str(text)?;
    if !tree.is_object() {
        return Err(DashSpecError::Parse(
            "dashboard spec must be a mapping at the top level".to_string(),
        ));
    }
    Ok(tree)
}

/// Renders a tree in canonical YAML: keys sorted, `dsl_version` first.
///
/// Two trees that differ only in key order canonicalize to the same text.
pub fn canonicalize(tree: &Value) -> Result<String> {
    let mut root = serde_yaml::Mapping::new();
    if let Value::Object(map) = tree {
        if let Some(version) = map.get("dsl_version") {
            root.insert("dsl_version".into(), serde_yaml::to_value(version)?);
        }
        // serde_json maps iterate in sorted key order
        for (key, value) in map.iter().filter(|(k, _)| k.as_str() != "dsl_version") {
            root.insert(key.as_str().into(), serde_yaml::to_value(value)?);
        }
        return Ok(serde_yaml::to_string(&root)?);
    }
    Ok(serde_yaml::to_string(tree)?)
}

impl Spec {
    /// Builds the typed model from a tree.
    ///
    /// Callers normally go through the schema validator first, which reports
    /// the same problems as structured violations.
    pub fn from_tree(tree: &Value) -> Result<Self> {
        Ok(serde_json::from_value(tree.clone())?)
    }

    /// Serializes the model back into a tree.
    pub fn to_tree(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.dashboard.pages.iter().find(|page| page.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::SCENARIO_A_SPEC;

    #[test]
    fn test_parse_yaml_rejects_non_mapping() {
        assert!(matches!(
            parse_yaml("- just\n- a list\n"),
            Err(DashSpecError::Parse(_))
        ));
        assert!(matches!(parse_yaml("a: [1,"), Err(DashSpecError::Parse(_))));
    }

    #[test]
    fn test_from_tree_round_trips() {
        let tree = parse_yaml(SCENARIO_A_SPEC).unwrap();
        let spec = Spec::from_tree(&tree).unwrap();
        assert_eq!(spec.version, "1.3.0");
        assert_eq!(spec.dashboard.pages.len(), 1);
        assert_eq!(spec.dashboard.pages[0].filters[0].kind, FilterKind::Range);

        let again = Spec::from_tree(&spec.to_tree().unwrap()).unwrap();
        assert_eq!(again, spec);
    }

    #[test]
    fn test_canonicalize_ignores_key_order() {
        let a = parse_yaml("dashboard: {title: T, id: d}\ndsl_version: '1.3.0'\n").unwrap();
        let b = parse_yaml("dsl_version: '1.3.0'\ndashboard: {id: d, title: T}\n").unwrap();
        let canonical = canonicalize(&a).unwrap();
        assert_eq!(canonical, canonicalize(&b).unwrap());
        assert!(canonical.starts_with("dsl_version"));
    }
}
