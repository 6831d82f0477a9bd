//! Enumerated vocabulary of the spec language.
//!
//! Every string-valued "enum" in the spec text maps to one of these closed
//! types. The schema validator checks raw strings against [`NAMES`] before
//! deserialization, so downstream code never sees an unknown token.
//!
//! [`NAMES`]: ChartKind::NAMES

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The spelling of every variant in spec text.
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            /// Returns the spelling used in spec text.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{other}', expected one of: {}",
                        stringify!($name),
                        Self::NAMES.join(", ")
                    )),
                }
            }
        }
    };
}

closed_enum! {
    /// Declared type of a dataset field.
    FieldType {
        Integer => "integer",
        Float => "float",
        String => "string",
        Boolean => "boolean",
        Date => "date",
    }
}

impl FieldType {
    /// Integer or float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// String or boolean.
    pub fn is_categorical(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Boolean)
    }
}

closed_enum! {
    /// Where the dataset comes from. Only carried through to the loader.
    DataSourceKind {
        Parquet => "parquet",
        Csv => "csv",
        Json => "json",
    }
}

closed_enum! {
    /// Kind of a page filter; decides the shape of its selection.
    FilterKind {
        Range => "range",
        Slider => "slider",
        Select => "select",
        Multiselect => "multiselect",
        DateRange => "date_range",
    }
}

closed_enum! {
    /// Aggregation applied by a metric.
    AggregationKind {
        Count => "count",
        CountUnique => "count_unique",
        Sum => "sum",
        Mean => "mean",
        Median => "median",
        Min => "min",
        Max => "max",
        Std => "std",
    }
}

impl AggregationKind {
    /// Whether the aggregation can run over a field of the given type.
    pub fn accepts(&self, field_type: FieldType) -> bool {
        match self {
            AggregationKind::Count | AggregationKind::CountUnique => true,
            _ => field_type.is_numeric(),
        }
    }
}

closed_enum! {
    /// Comparison operator of a metric sub-filter.
    ComparisonOperator {
        Eq => "eq",
        Ne => "ne",
        Gt => "gt",
        Gte => "gte",
        Lt => "lt",
        Lte => "lte",
        In => "in",
        NotIn => "not_in",
    }
}

impl ComparisonOperator {
    /// Whether the operator expects a list operand.
    pub fn takes_list(&self) -> bool {
        matches!(self, ComparisonOperator::In | ComparisonOperator::NotIn)
    }

    /// Whether the operator needs an ordering on the field.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Gt
                | ComparisonOperator::Gte
                | ComparisonOperator::Lt
                | ComparisonOperator::Lte
        )
    }
}

closed_enum! {
    /// Chart kinds known to the standard registry.
    ChartKind {
        Histogram => "histogram",
        Ecdf => "ecdf",
        Kde => "kde",
        Boxplot => "boxplot",
        Violin => "violin",
        Strip => "strip",
        Scatter => "scatter",
        Hexbin => "hexbin",
        Kde2d => "kde2d",
        Line => "line",
        Area => "area",
        Bar => "bar",
        Pie => "pie",
        Heatmap => "heatmap",
        CorrelationMatrix => "correlation_matrix",
    }
}

closed_enum! {
    /// Named semantic slot of a visualization.
    Role {
        X => "x",
        Y => "y",
        Color => "color",
        Size => "size",
        By => "by",
        Facet => "facet",
    }
}

closed_enum! {
    /// How a page arranges its components.
    LayoutKind {
        Single => "single",
        Grid => "grid",
        Tabs => "tabs",
    }
}

closed_enum! {
    /// Relative width of a component.
    Width {
        Full => "full",
        Half => "half",
        Third => "third",
        Quarter => "quarter",
        TwoThirds => "two-thirds",
    }
}

impl Width {
    /// Width as a fraction of the row.
    pub fn fraction(&self) -> f64 {
        match self {
            Width::Full => 1.0,
            Width::Half => 0.5,
            Width::Third => 1.0 / 3.0,
            Width::Quarter => 0.25,
            Width::TwoThirds => 2.0 / 3.0,
        }
    }
}

closed_enum! {
    /// Tag of a layout component.
    ComponentKind {
        Visualization => "visualization",
        Text => "text",
        MetricCard => "metric_card",
    }
}

closed_enum! {
    /// Display format of a numeric value.
    FormatKind {
        Integer => "integer",
        Number => "number",
        Currency => "currency",
        Percent => "percent",
    }
}

closed_enum! {
    /// Outlier detection method.
    OutlierMethod {
        Percentile => "percentile",
        Zscore => "zscore",
        Iqr => "iqr",
        IsolationForest => "isolation_forest",
    }
}

closed_enum! {
    /// What to do with detected outliers.
    OutlierAction {
        Cap => "cap",
        Remove => "remove",
        Flag => "flag",
    }
}

closed_enum! {
    /// Missing value handling strategy.
    MissingValueStrategy {
        Auto => "auto",
        DropRows => "drop_rows",
        DropColumn => "drop_column",
        FillMean => "fill_mean",
        FillMedian => "fill_median",
        FillMode => "fill_mode",
        FillForward => "fill_forward",
        FillBackward => "fill_backward",
        FillValue => "fill_value",
        Interpolate => "interpolate",
        Flag => "flag",
    }
}

closed_enum! {
    /// Which occurrence of a duplicate row survives.
    DuplicateKeep {
        First => "first",
        Last => "last",
    }
}

closed_enum! {
    /// What to do with duplicate rows.
    DuplicateAction {
        Drop => "drop",
        Flag => "flag",
    }
}

closed_enum! {
    /// Row-level constraint checked by a data quality validation rule.
    ValidationConstraint {
        Range => "range",
        InSet => "in_set",
        NotNull => "not_null",
        Unique => "unique",
    }
}

closed_enum! {
    /// What to do with rows breaking a validation rule.
    ValidationAction {
        Drop => "drop",
        Flag => "flag",
        Coerce => "coerce",
    }
}

impl Default for ValidationAction {
    fn default() -> Self {
        ValidationAction::Flag
    }
}

closed_enum! {
    /// Validation policy strictness.
    Strictness {
        Strict => "strict",
        Moderate => "moderate",
        Relaxed => "relaxed",
    }
}

impl Default for Strictness {
    fn default() -> Self {
        Strictness::Moderate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_as_str() {
        for kind in ChartKind::ALL {
            assert_eq!(kind.as_str().parse::<ChartKind>().unwrap(), *kind);
        }
        assert_eq!(ChartKind::ALL.len(), 15);
        assert_eq!(ChartKind::NAMES.len(), ChartKind::ALL.len());
    }

    #[test]
    fn test_serde_uses_spec_spelling() {
        let width: Width = serde_json::from_str("\"two-thirds\"").unwrap();
        assert_eq!(width, Width::TwoThirds);
        assert_eq!(
            serde_json::to_string(&MissingValueStrategy::FillMedian).unwrap(),
            "\"fill_median\""
        );
    }

    #[test]
    fn test_unknown_token_lists_alternatives() {
        let err = "donut".parse::<ChartKind>().unwrap_err();
        assert!(err.contains("donut"));
        assert!(err.contains("scatter"));
    }

    #[test]
    fn test_validation_rule_vocabulary() {
        assert_eq!("in_set".parse::<ValidationConstraint>(), Ok(ValidationConstraint::InSet));
        assert_eq!(ValidationAction::default(), ValidationAction::Flag);
        assert!(MissingValueStrategy::NAMES.contains(&"interpolate"));
    }

    #[test]
    fn test_aggregation_compatibility() {
        assert!(AggregationKind::Count.accepts(FieldType::String));
        assert!(AggregationKind::CountUnique.accepts(FieldType::Date));
        assert!(AggregationKind::Mean.accepts(FieldType::Float));
        assert!(!AggregationKind::Mean.accepts(FieldType::String));
        assert!(!AggregationKind::Max.accepts(FieldType::Date));
    }
}
