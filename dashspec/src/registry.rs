//! Chart registry: what each chart kind requires and accepts.
//!
//! The registry is an immutable value handed to the validator and compiler at
//! construction time. There is no process-wide registration; hosts that need
//! extra parameters build their own registry from [`ChartRegistry::standard`].

use crate::spec::{ChartKind, Role};
use serde_json::Value;
use std::collections::BTreeMap;

/// Family a chart kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFamily {
    Distribution,
    Relationship,
    Categorical,
    Matrix,
}

/// Expected type of a visualization parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Bool,
    /// Any number within the inclusive range.
    Number { min: f64, max: f64 },
    /// Integer >= 1.
    PositiveInteger,
    /// One of a fixed set of strings.
    Choice(&'static [&'static str]),
}

impl ParamKind {
    /// Checks a raw parameter value, returning a description of the expectation on failure.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            ParamKind::Bool if value.is_boolean() => Ok(()),
            ParamKind::Bool => Err("a boolean".to_string()),
            ParamKind::Number { min, max } => match value.as_f64() {
                Some(n) if n >= *min && n <= *max => Ok(()),
                _ => Err(format!("a number between {min} and {max}")),
            },
            ParamKind::PositiveInteger => match value.as_u64() {
                Some(n) if n >= 1 => Ok(()),
                _ => Err("an integer >= 1".to_string()),
            },
            ParamKind::Choice(options) => match value.as_str() {
                Some(s) if options.contains(&s) => Ok(()),
                _ => Err(format!("one of: {}", options.join(", "))),
            },
        }
    }
}

/// Recognized parameter of a chart kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind }
    }
}

/// Everything the validator and compiler need to know about one chart kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDescriptor {
    pub kind: ChartKind,
    pub family: ChartFamily,
    pub required_roles: Vec<Role>,
    pub optional_roles: Vec<Role>,
    pub params: Vec<ParamSpec>,
}

impl ChartDescriptor {
    pub fn new(kind: ChartKind, family: ChartFamily) -> Self {
        Self {
            kind,
            family,
            required_roles: Vec::new(),
            optional_roles: Vec::new(),
            params: common_params(),
        }
    }

    pub fn requires(mut self, roles: &[Role]) -> Self {
        self.required_roles.extend_from_slice(roles);
        self
    }

    pub fn accepts(mut self, roles: &[Role]) -> Self {
        self.optional_roles.extend_from_slice(roles);
        self
    }

    pub fn param(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.params.push(ParamSpec::new(name, kind));
        self
    }

    /// Whether the role is required or optional for this chart kind.
    pub fn accepts_role(&self, role: Role) -> bool {
        self.required_roles.contains(&role) || self.optional_roles.contains(&role)
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

fn common_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("limit", ParamKind::PositiveInteger),
        ParamSpec::new("alpha", ParamKind::Number { min: 0.0, max: 1.0 }),
    ]
}

/// Immutable mapping from chart kind to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRegistry {
    charts: BTreeMap<ChartKind, ChartDescriptor>,
}

impl ChartRegistry {
    /// An empty registry; every chart kind is unknown.
    pub fn empty() -> Self {
        Self {
            charts: BTreeMap::new(),
        }
    }

    /// The registry covering every [`ChartKind`].
    pub fn standard() -> Self {
        use ChartFamily::*;
        use ParamKind::*;
        use Role::*;

        const TRENDLINES: &[&str] = &["none", "ols", "lowess"];
        const CORRELATION_METHODS: &[&str] = &["pearson", "spearman", "kendall"];
        const VIOLIN_INNER: &[&str] = &["box", "quartile", "point", "stick", "none"];

        let descriptors = vec![
            ChartDescriptor::new(ChartKind::Histogram, Distribution)
                .requires(&[X])
                .accepts(&[Color, Facet])
                .param("bins", PositiveInteger)
                .param("log_x", Bool)
                .param("log_y", Bool),
            ChartDescriptor::new(ChartKind::Ecdf, Distribution)
                .requires(&[X])
                .accepts(&[Color])
                .param("log_x", Bool),
            ChartDescriptor::new(ChartKind::Kde, Distribution)
                .requires(&[X])
                .accepts(&[Color])
                .param("log_x", Bool),
            ChartDescriptor::new(ChartKind::Boxplot, Distribution)
                .requires(&[Y])
                .accepts(&[X, By, Color])
                .param("log_y", Bool),
            ChartDescriptor::new(ChartKind::Violin, Distribution)
                .requires(&[Y])
                .accepts(&[X, By, Color])
                .param("inner", Choice(VIOLIN_INNER)),
            ChartDescriptor::new(ChartKind::Strip, Distribution)
                .requires(&[Y])
                .accepts(&[X, By, Color]),
            ChartDescriptor::new(ChartKind::Scatter, Relationship)
                .requires(&[X, Y])
                .accepts(&[Color, Size, Facet])
                .param("trendline", Choice(TRENDLINES))
                .param("log_x", Bool)
                .param("log_y", Bool),
            ChartDescriptor::new(ChartKind::Hexbin, Relationship)
                .requires(&[X, Y])
                .param("gridsize", PositiveInteger)
                .param("log_x", Bool),
            ChartDescriptor::new(ChartKind::Kde2d, Relationship)
                .requires(&[X, Y])
                .accepts(&[Color]),
            ChartDescriptor::new(ChartKind::Line, Relationship)
                .requires(&[X, Y])
                .accepts(&[Color, Facet])
                .param("log_y", Bool),
            ChartDescriptor::new(ChartKind::Area, Relationship)
                .requires(&[X, Y])
                .accepts(&[Color]),
            ChartDescriptor::new(ChartKind::Bar, Categorical)
                .requires(&[X, Y])
                .accepts(&[Color, Facet])
                .param("horizontal", Bool),
            ChartDescriptor::new(ChartKind::Pie, Categorical)
                .requires(&[X])
                .accepts(&[Y]),
            ChartDescriptor::new(ChartKind::Heatmap, Matrix)
                .requires(&[X, Y])
                .accepts(&[Color]),
            ChartDescriptor::new(ChartKind::CorrelationMatrix, Matrix)
                .param("method", Choice(CORRELATION_METHODS))
                .param("mask_upper", Bool),
        ];

        Self {
            charts: descriptors.into_iter().map(|d| (d.kind, d)).collect(),
        }
    }

    /// Returns a registry with `descriptor` added or replaced.
    pub fn with_chart(mut self, descriptor: ChartDescriptor) -> Self {
        self.charts.insert(descriptor.kind, descriptor);
        self
    }

    pub fn descriptor(&self, kind: ChartKind) -> Option<&ChartDescriptor> {
        self.charts.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}

impl Default for ChartRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
