//! Locale-threaded collaborators (§6, §9): "locale threads only through sort
//! and format". Text collation and value formatting are external-collaborator
//! interfaces per the spec — this module carries honestly-scoped default
//! implementations rather than a fabricated ICU/collation dependency (no
//! example in this crate's retrieved pack pulls one in).

use std::cmp::Ordering;

use crate::value::{Value, ValueType};

/// A locale tag plus the one collation knob this crate actually implements.
/// Real locale-aware collation (accent folding, locale-specific alphabetical
/// order) is out of scope without an ICU-class dependency; see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    pub tag: String,
    pub case_insensitive_text: bool,
}

impl Locale {
    pub fn root() -> Self {
        Locale {
            tag: "root".to_string(),
            case_insensitive_text: false,
        }
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Locale {
            tag: tag.into(),
            case_insensitive_text: false,
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::root()
    }
}

/// Text collation used by the sort phase (§4.9): plain code-point order, with
/// an optional case-insensitive fold. Every other `Value` variant already has
/// a locale-independent total order via `Value::compare`.
pub fn collate_text(a: &str, b: &str, locale: &Locale) -> Ordering {
    if locale.case_insensitive_text {
        a.to_lowercase().cmp(&b.to_lowercase())
    } else {
        a.cmp(b)
    }
}

/// Renders a [`Value`] into the `formatted` string stored on a `TableCell`
/// (§4.11). Pattern syntax is opaque to the query engine — a factory is free
/// to reject a pattern by returning `None` from
/// [`ValueFormatterFactory::formatter`], which the engine turns into an
/// `ILLEGAL_FORMATTING_PATTERNS` warning rather than an error.
pub trait ValueFormatter {
    fn format(&self, value: &Value) -> String;
}

/// `(type, pattern, locale) -> formatter | none` (§6).
pub trait ValueFormatterFactory {
    fn formatter(&self, value_type: ValueType, pattern: &str, locale: &Locale) -> Option<Box<dyn ValueFormatter>>;
}

/// Default factory: a `0.0…` fixed-decimals pattern for numbers, verbatim
/// display for everything else. Host applications with real locale-aware
/// formatting needs supply their own `ValueFormatterFactory`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueFormatterFactory;

impl ValueFormatterFactory for DefaultValueFormatterFactory {
    fn formatter(&self, value_type: ValueType, pattern: &str, _locale: &Locale) -> Option<Box<dyn ValueFormatter>> {
        match value_type {
            ValueType::Number => parse_fixed_decimals(pattern).map(|decimals| {
                Box::new(FixedDecimalsFormatter(decimals)) as Box<dyn ValueFormatter>
            }),
            _ => None,
        }
    }
}

/// `"0.00"`-style pattern: a literal `0.` followed by one or more `0`s, one
/// per decimal place.
fn parse_fixed_decimals(pattern: &str) -> Option<usize> {
    let rest = pattern.strip_prefix("0.")?;
    if rest.is_empty() || !rest.chars().all(|c| c == '0') {
        return None;
    }
    Some(rest.len())
}

struct FixedDecimalsFormatter(usize);

impl ValueFormatter for FixedDecimalsFormatter {
    fn format(&self, value: &Value) -> String {
        match value {
            Value::Number(Some(n)) => format!("{:.*}", self.0, n),
            other => other.to_display_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collation_is_case_sensitive_by_default() {
        let locale = Locale::root();
        assert_eq!(collate_text("Band", "band", &locale), Ordering::Less);
    }

    #[test]
    fn collation_can_fold_case() {
        let locale = Locale {
            tag: "root".to_string(),
            case_insensitive_text: true,
        };
        assert_eq!(collate_text("Band", "band", &locale), Ordering::Equal);
    }

    #[test]
    fn fixed_decimals_pattern_formats_number() {
        let factory = DefaultValueFormatterFactory;
        let formatter = factory.formatter(ValueType::Number, "0.00", &Locale::root()).unwrap();
        assert_eq!(formatter.format(&Value::Number(Some(1.5))), "1.50");
    }

    #[test]
    fn unknown_pattern_syntax_is_rejected() {
        let factory = DefaultValueFormatterFactory;
        assert!(factory.formatter(ValueType::Number, "#,##0", &Locale::root()).is_none());
    }
}
