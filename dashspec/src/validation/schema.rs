//! Closed-world structural validation of the parsed tree.
//!
//! The accepted document shape is written down once as a [`Shape`] tree,
//! built from the same enumerated vocabulary the typed model deserializes
//! into. Every object is closed: keys not listed are reported.

use super::{codes, pointer_segment, Severity, Violation};
use crate::spec::kinds::*;
use crate::spec::Spec;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^1\.[0-3](\.\d+)?$").expect("Hard-coded regex pattern should be valid")
});

/// Supported language versions, as shown in repair hints.
pub const SUPPORTED_VERSIONS: &str = "1.0 – 1.3";

#[derive(Debug, Clone)]
struct Prop {
    name: &'static str,
    shape: Shape,
    required: bool,
}

fn req(name: &'static str, shape: Shape) -> Prop {
    Prop {
        name,
        shape,
        required: true,
    }
}

fn opt(name: &'static str, shape: Shape) -> Prop {
    Prop {
        name,
        shape,
        required: false,
    }
}

#[derive(Debug, Clone)]
enum Shape {
    Object(Vec<Prop>),
    /// Object whose `tag` key selects the variant's property list.
    Tagged {
        tag: &'static str,
        variants: Vec<(&'static str, Vec<Prop>)>,
    },
    /// Free-form string keys.
    Map(Box<Shape>),
    /// Keys restricted to an enumerated vocabulary.
    KeyedMap {
        keys: &'static [&'static str],
        value: Box<Shape>,
    },
    Array(Box<Shape>),
    Str,
    Enum(&'static [&'static str]),
    Number,
    Integer,
    UnsignedInteger,
    Bool,
    Version,
    Any,
}

impl Shape {
    fn describe(&self) -> &'static str {
        match self {
            Shape::Object(_) | Shape::Tagged { .. } | Shape::Map(_) | Shape::KeyedMap { .. } => {
                "mapping"
            }
            Shape::Array(_) => "sequence",
            Shape::Str | Shape::Enum(_) | Shape::Version => "string",
            Shape::Number => "number",
            Shape::Integer => "integer",
            Shape::UnsignedInteger => "non-negative integer",
            Shape::Bool => "boolean",
            Shape::Any => "value",
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

fn join(path: &str, segment: impl std::fmt::Display) -> String {
    format!("{path}/{}", pointer_segment(&segment.to_string()))
}

/// Validates the raw tree against the closed document shape.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    root: Shape,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            root: document_shape(),
        }
    }

    /// Returns every structural violation in `tree`. Never mutates the tree.
    ///
    /// When the shape checks pass but the typed model still rejects the tree,
    /// a single `SCHEMA_VIOLATION` carrying the deserializer's message is
    /// reported, so a clean result always means [`Spec::from_tree`] succeeds.
    #[instrument(skip_all)]
    pub fn validate(&self, tree: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        check(&self.root, tree, "", &mut violations);

        if violations.is_empty() {
            if let Err(err) = Spec::from_tree(tree) {
                violations.push(Violation::new(
                    codes::SCHEMA_VIOLATION,
                    Severity::Error,
                    format!("Spec does not match the document model: {err}"),
                    "/",
                    "Ensure the spec conforms to the documented structure",
                ));
            }
        }

        debug!(violations = violations.len(), "Schema validation finished");
        violations
    }
}

fn check(shape: &Shape, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match shape {
        Shape::Object(props) => match value.as_object() {
            Some(map) => check_props(props, map, path, out),
            None => out.push(mismatch(shape, value, path)),
        },
        Shape::Tagged { tag, variants } => {
            let Some(map) = value.as_object() else {
                out.push(mismatch(shape, value, path));
                return;
            };
            let names: Vec<&str> = variants.iter().map(|(name, _)| *name).collect();
            match map.get(*tag) {
                None => out.push(missing(tag, path)),
                Some(Value::String(selected)) => {
                    match variants.iter().find(|(name, _)| *name == selected.as_str()) {
                        Some((_, props)) => check_props(props, map, path, out),
                        None => out.push(enum_mismatch(selected, &names, &join(path, tag))),
                    }
                }
                Some(other) => out.push(mismatch(&Shape::Str, other, &join(path, tag))),
            }
        }
        Shape::Map(inner) => match value.as_object() {
            Some(map) => {
                for (key, item) in map {
                    check(inner, item, &join(path, key), out);
                }
            }
            None => out.push(mismatch(shape, value, path)),
        },
        Shape::KeyedMap { keys, value: inner } => match value.as_object() {
            Some(map) => {
                for (key, item) in map {
                    if keys.contains(&key.as_str()) {
                        check(inner, item, &join(path, key), out);
                    } else {
                        out.push(enum_mismatch(key, keys, &join(path, key)));
                    }
                }
            }
            None => out.push(mismatch(shape, value, path)),
        },
        Shape::Array(inner) => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    check(inner, item, &join(path, idx), out);
                }
            }
            None => out.push(mismatch(shape, value, path)),
        },
        Shape::Str if value.is_string() => {}
        Shape::Enum(names) => match value.as_str() {
            Some(s) if names.contains(&s) => {}
            Some(s) => out.push(enum_mismatch(s, names, path)),
            None => out.push(mismatch(shape, value, path)),
        },
        Shape::Number if value.is_number() => {}
        Shape::Integer if value.is_i64() || value.is_u64() => {}
        Shape::UnsignedInteger if value.is_u64() => {}
        Shape::Bool if value.is_boolean() => {}
        Shape::Version => match value.as_str() {
            Some(v) if VERSION_PATTERN.is_match(v) => {}
            Some(v) => out.push(Violation::new(
                codes::UNSUPPORTED_VERSION,
                Severity::Error,
                format!("Unsupported dsl_version '{v}'"),
                path,
                format!("Use a supported version ({SUPPORTED_VERSIONS}), e.g. '1.3.0'"),
            )),
            None => out.push(Violation::new(
                codes::SCHEMA_TYPE_MISMATCH,
                Severity::Error,
                format!("dsl_version must be a string, found {}", type_name(value)),
                path,
                "Quote the version, e.g. dsl_version: '1.3.0'",
            )),
        },
        Shape::Any => {}
        _ => out.push(mismatch(shape, value, path)),
    }
}

fn check_props(
    props: &[Prop],
    map: &serde_json::Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    for prop in props {
        match map.get(prop.name) {
            None if prop.required => out.push(missing(prop.name, path)),
            None => {}
            // an empty optional key (`description:`) is treated as absent
            Some(Value::Null) if !prop.required => {}
            Some(value) => check(&prop.shape, value, &join(path, prop.name), out),
        }
    }
    for key in map.keys() {
        if !props.iter().any(|prop| prop.name == key) {
            let allowed: Vec<&str> = props.iter().map(|p| p.name).collect();
            out.push(Violation::new(
                codes::SCHEMA_UNKNOWN_FIELD,
                Severity::Error,
                format!("Unknown field '{key}'"),
                join(path, key),
                format!("Remove '{key}'; allowed fields: {}", allowed.join(", ")),
            ));
        }
    }
}

fn missing(name: &str, path: &str) -> Violation {
    let at = if path.is_empty() { "/" } else { path };
    Violation::new(
        codes::SCHEMA_MISSING_FIELD,
        Severity::Critical,
        format!("Missing required field '{name}' at {at}"),
        join(path, name),
        format!("Add the '{name}' field"),
    )
}

fn mismatch(expected: &Shape, value: &Value, path: &str) -> Violation {
    Violation::new(
        codes::SCHEMA_TYPE_MISMATCH,
        Severity::Error,
        format!(
            "Expected {}, found {}",
            expected.describe(),
            type_name(value)
        ),
        path,
        format!("Provide a {} here", expected.describe()),
    )
}

fn enum_mismatch(found: &str, allowed: &[&str], path: &str) -> Violation {
    Violation::new(
        codes::SCHEMA_ENUM_MISMATCH,
        Severity::Error,
        format!("'{found}' is not a recognized value"),
        path,
        format!("Use one of: {}", allowed.join(", ")),
    )
}

fn document_shape() -> Shape {
    use Shape::*;

    let field_format = || {
        Object(vec![
            req("type", Enum(FormatKind::NAMES)),
            opt("precision", Integer),
            opt("use_thousands_separator", Bool),
            opt("currency_code", Str),
        ])
    };

    let metadata = Object(vec![
        opt("dataset_name", Str),
        opt("description", Str),
        opt("source", Str),
        opt("row_count", UnsignedInteger),
        opt("currency", Str),
        opt("narrative", Str),
    ]);

    let data_quality = Object(vec![
        opt(
            "missing_values",
            Object(vec![
                req("strategy", Enum(MissingValueStrategy::NAMES)),
                opt("fill_value", Any),
                opt("fields", Array(Box::new(Str))),
                opt("max_missing_fraction", Number),
            ]),
        ),
        opt(
            "duplicates",
            Object(vec![
                opt("enabled", Bool),
                opt("subset", Array(Box::new(Str))),
                opt("keep", Enum(DuplicateKeep::NAMES)),
                opt("action", Enum(DuplicateAction::NAMES)),
            ]),
        ),
        opt(
            "outliers",
            Object(vec![
                opt("enabled", Bool),
                opt(
                    "rules",
                    Array(Box::new(Object(vec![
                        req("fields", Array(Box::new(Str))),
                        req("method", Enum(OutlierMethod::NAMES)),
                        req("action", Enum(OutlierAction::NAMES)),
                        opt("lower", Number),
                        opt("upper", Number),
                        opt("threshold", Number),
                        opt("contamination", Number),
                    ]))),
                ),
            ]),
        ),
        opt(
            "validation",
            Object(vec![opt(
                "rules",
                Array(Box::new(Object(vec![
                    req("field", Str),
                    req("constraint", Enum(ValidationConstraint::NAMES)),
                    opt("action", Enum(ValidationAction::NAMES)),
                    opt("min", Number),
                    opt("max", Number),
                    opt("values", Array(Box::new(Any))),
                    opt("default", Any),
                ]))),
            )]),
        ),
    ]);

    let data_source = Object(vec![
        req("type", Enum(DataSourceKind::NAMES)),
        req("path", Str),
        opt("schema", Map(Box::new(Enum(FieldType::NAMES)))),
        opt("formatting", Map(Box::new(field_format()))),
        opt("default_formatting", field_format()),
        opt("column_labels", Map(Box::new(Str))),
        opt("data_quality", data_quality),
    ]);

    let filter = Object(vec![
        req("id", Str),
        req("field", Str),
        req("type", Enum(FilterKind::NAMES)),
        opt("label", Str),
        opt("default", Any),
    ]);

    let metric = Object(vec![
        req("id", Str),
        req("field", Str),
        req("aggregation", Enum(AggregationKind::NAMES)),
        opt(
            "filter",
            Object(vec![
                req("field", Str),
                req("operator", Enum(ComparisonOperator::NAMES)),
                req("value", Any),
            ]),
        ),
        opt("label", Str),
        opt("format", Enum(FormatKind::NAMES)),
    ]);

    let component_base = || {
        vec![
            req("type", Str),
            opt("id", Str),
            opt("title", Str),
            opt("width", Enum(Width::NAMES)),
        ]
    };
    let with = |mut props: Vec<Prop>, extra: Prop| {
        props.push(extra);
        props
    };

    let visualization = Object(vec![
        req("chart_type", Enum(ChartKind::NAMES)),
        opt(
            "roles",
            KeyedMap {
                keys: Role::NAMES,
                value: Box::new(Str),
            },
        ),
        opt("params", Map(Box::new(Any))),
    ]);

    let component = Tagged {
        tag: "type",
        variants: vec![
            (
                ComponentKind::Visualization.as_str(),
                with(component_base(), req("visualization", visualization)),
            ),
            (
                ComponentKind::Text.as_str(),
                with(component_base(), req("text", Str)),
            ),
            (
                ComponentKind::MetricCard.as_str(),
                with(component_base(), req("metric_id", Str)),
            ),
        ],
    };

    let page = Object(vec![
        req("id", Str),
        req("title", Str),
        opt("description", Str),
        opt("filters", Array(Box::new(filter))),
        opt("metrics", Array(Box::new(metric))),
        req(
            "layout",
            Object(vec![
                req("type", Enum(LayoutKind::NAMES)),
                req("components", Array(Box::new(component))),
            ]),
        ),
    ]);

    let dashboard = Object(vec![
        req("id", Str),
        req("title", Str),
        opt("description", Str),
        req("data_source", data_source),
        opt("metadata", metadata),
        req("pages", Array(Box::new(page))),
    ]);

    let policy = Object(vec![
        opt("strictness", Enum(Strictness::NAMES)),
        opt("auto_correct", Bool),
        opt("fail_on_warnings", Bool),
        opt("suppress_codes", Array(Box::new(Str))),
    ]);

    Object(vec![
        req("dsl_version", Version),
        req("dashboard", dashboard),
        opt("validation_policy", policy),
    ])
}
