//! Number formatting and column labels.
//!
//! Everything here is a pure function of its arguments. Precision is assumed
//! to be within range; the semantic validator rejects anything else before a
//! plan is compiled.

use crate::spec::FormatKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ISO 4217 code → display symbol.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("AED", "AED"),
    ("ARS", "AR$"),
    ("AUD", "A$"),
    ("BRL", "R$"),
    ("CAD", "C$"),
    ("CHF", "CHF"),
    ("CLP", "CLP$"),
    ("CNY", "¥"),
    ("COP", "COL$"),
    ("CZK", "Kč"),
    ("DKK", "kr"),
    ("EGP", "E£"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("HKD", "HK$"),
    ("IDR", "Rp"),
    ("ILS", "₪"),
    ("INR", "₹"),
    ("JPY", "¥"),
    ("KRW", "₩"),
    ("MXN", "Mex$"),
    ("MYR", "RM"),
    ("NGN", "₦"),
    ("NOK", "kr"),
    ("NZD", "NZ$"),
    ("PEN", "S/"),
    ("PHP", "₱"),
    ("PKR", "Rs"),
    ("PLN", "zł"),
    ("RUB", "₽"),
    ("SAR", "SR"),
    ("SEK", "kr"),
    ("SGD", "S$"),
    ("THB", "฿"),
    ("TRY", "₺"),
    ("TWD", "NT$"),
    ("USD", "$"),
    ("VND", "₫"),
    ("ZAR", "R"),
];

/// Symbol for an ISO 4217 code, case-insensitive.
pub fn currency_symbol(code: &str) -> Option<&'static str> {
    let upper = code.to_ascii_uppercase();
    CURRENCY_SYMBOLS
        .binary_search_by(|(c, _)| (*c).cmp(upper.as_str()))
        .ok()
        .map(|idx| CURRENCY_SYMBOLS[idx].1)
}

/// Symbol for the code, or the code followed by a space when unknown.
pub fn currency_marker(code: &str) -> String {
    currency_symbol(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} ", code.to_ascii_uppercase()))
}

/// A display format with every default materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFormat {
    pub kind: FormatKind,
    /// Fraction digits; `None` means the kind's default.
    pub precision: Option<u8>,
    pub thousands_separator: bool,
    /// Only meaningful for `currency`.
    pub currency_code: Option<String>,
}

impl ResolvedFormat {
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            precision: None,
            thousands_separator: true,
            currency_code: None,
        }
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_thousands_separator(mut self, enabled: bool) -> Self {
        self.thousands_separator = enabled;
        self
    }

    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        self.currency_code = Some(code.into());
        self
    }

    /// Formats a value.
    pub fn format(&self, value: f64) -> String {
        format_number(value, self)
    }
}

/// Formats `value` according to `format`.
///
/// - `integer`: nearest whole number
/// - `number`: `precision` digits, or up to three significant fraction digits when unset
/// - `currency`: currency marker, `precision` digits (default 2)
/// - `percent`: value × 100 with `precision` digits (default 1) and a `%` suffix
pub fn format_number(value: f64, format: &ResolvedFormat) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let grouping = format.thousands_separator;
    match format.kind {
        FormatKind::Integer => fixed(value.round(), 0, grouping),
        FormatKind::Number => match format.precision {
            Some(precision) => fixed(value, precision as usize, grouping),
            None if value.fract() == 0.0 => fixed(value, 0, grouping),
            None => {
                let text = fixed(value, 3, grouping);
                text.trim_end_matches('0').trim_end_matches('.').to_string()
            }
        },
        FormatKind::Currency => {
            let precision = format.precision.unwrap_or(2) as usize;
            let marker = format
                .currency_code
                .as_deref()
                .map(currency_marker)
                .unwrap_or_else(|| "$".to_string());
            let magnitude = fixed(value.abs(), precision, grouping);
            if value < 0.0 && magnitude.chars().any(|c| c.is_ascii_digit() && c != '0') {
                format!("-{marker}{magnitude}")
            } else {
                format!("{marker}{magnitude}")
            }
        }
        FormatKind::Percent => {
            let precision = format.precision.unwrap_or(1) as usize;
            format!("{}%", fixed(value * 100.0, precision, grouping))
        }
    }
}

/// Formats an optional value, showing `undefined` for `None` and non-finite values.
pub fn format_optional(value: Option<f64>, format: &ResolvedFormat, undefined: &str) -> String {
    match value {
        Some(v) if v.is_finite() => format_number(v, format),
        _ => undefined.to_string(),
    }
}

fn fixed(value: f64, precision: usize, grouping: bool) -> String {
    let mut text = format!("{value:.precision$}");
    // small negatives round to "-0" or "-0.00"
    if text.starts_with('-') && text.chars().all(|c| matches!(c, '-' | '0' | '.')) {
        text.remove(0);
    }
    if grouping {
        group_thousands(&text)
    } else {
        text
    }
}

/// Inserts `,` every three digits of the integer part of a decimal string.
pub fn group_thousands(text: &str) -> String {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Human-readable label from a snake_case or camelCase column name.
pub fn auto_label(field: &str) -> String {
    if field.contains('_') {
        return field
            .split('_')
            .filter(|word| !word.is_empty())
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ");
    }

    let mut spaced = String::with_capacity(field.len() + 4);
    let mut previous_lower = false;
    for ch in field.chars() {
        if ch.is_uppercase() && previous_lower {
            spaced.push(' ');
        }
        previous_lower = ch.is_lowercase();
        spaced.push(ch);
    }
    spaced
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Label for a field: the explicit label if any, otherwise [`auto_label`].
pub fn column_label(field: &str, labels: &BTreeMap<String, String>) -> String {
    labels
        .get(field)
        .cloned()
        .unwrap_or_else(|| auto_label(field))
}

/// Chart axis label: the column label plus a unit suffix for percent and currency formats.
pub fn axis_label(
    field: &str,
    labels: &BTreeMap<String, String>,
    format: Option<&ResolvedFormat>,
) -> String {
    let label = column_label(field, labels);
    match format {
        Some(f) if f.kind == FormatKind::Percent => format!("{label} (%)"),
        Some(ResolvedFormat {
            kind: FormatKind::Currency,
            currency_code: Some(code),
            ..
        }) => format!("{label} ({code})"),
        _ => label,
    }
}
