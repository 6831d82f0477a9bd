//! Field catalog: the dataset schema the validators and compiler resolve
//! references against.

use crate::spec::{FieldType, Spec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name → declared type, in name order.
///
/// A catalog is built from the spec's declared `schema`, from an inferred
/// dataset schema, or from both (declared types win).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    fields: BTreeMap<String, FieldType>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the fields declared in the spec's data source.
    pub fn declared(spec: &Spec) -> Self {
        Self {
            fields: spec.dashboard.data_source.schema.clone(),
        }
    }

    /// Adds a field, replacing any existing type.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Merges `inferred` underneath `self`: fields already present keep their type.
    pub fn merged_with(mut self, inferred: &FieldCatalog) -> Self {
        for (name, field_type) in &inferred.fields {
            self.fields.entry(name.clone()).or_insert(*field_type);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Position of a field in name order; used as its handle in compiled plans.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.keys().position(|key| key == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<(String, FieldType)> for FieldCatalog {
    fn from_iter<I: IntoIterator<Item = (String, FieldType)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
