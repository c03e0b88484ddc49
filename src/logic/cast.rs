//! Value coercion used when serializing variants and constraint values.
//!
//! Both functions are total: malformed numeric input becomes `NaN` and is
//! sent as such rather than rejected.

use crate::model::{Scalar, VariantType};

/// Coerces `value` to the declared `kind`, following loose-typing rules:
/// empty strings, zero and `NaN` are false; blank strings are zero.
pub fn cast(value: &Scalar, kind: VariantType) -> Scalar {
    match kind {
        VariantType::Boolean => Scalar::Bool(truthy(value)),
        VariantType::Number => Scalar::Number(to_number(value)),
        VariantType::String => Scalar::String(to_text(value)),
    }
}

/// Guesses the type of a free-form string: numbers first, then the
/// `true`/`false` literals, otherwise the string is kept. Non-strings are
/// returned unchanged.
pub fn infer_cast(value: &Scalar) -> Scalar {
    let Scalar::String(text) = value else {
        return value.clone();
    };
    if let Some(n) = parse_lossless_number(text) {
        return Scalar::Number(n);
    }
    match text.as_str() {
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => value.clone(),
    }
}

fn truthy(value: &Scalar) -> bool {
    match value {
        Scalar::Bool(b) => *b,
        Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
        Scalar::String(s) => !s.is_empty(),
    }
}

fn to_number(value: &Scalar) -> f64 {
    match value {
        Scalar::Bool(true) => 1.0,
        Scalar::Bool(false) => 0.0,
        Scalar::Number(n) => *n,
        Scalar::String(s) => parse_number(s),
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust accepts "inf"/"nan" spellings that loose numeric coercion rejects.
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn to_text(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Number(n) => format_number(*n),
        Scalar::String(s) => s.clone(),
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// A string is losslessly numeric when it parses to a finite number that
/// renders back to exactly the same text.
fn parse_lossless_number(text: &str) -> Option<f64> {
    let n = text.parse::<f64>().ok()?;
    if !n.is_finite() {
        return None;
    }
    (format_number(n) == text).then_some(n)
}
