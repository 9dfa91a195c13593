//! Decoding of untyped remote values into canonical ones.
//!
//! Sensors publish whatever their firmware produces: `72`, `"72"`, `"72 "`,
//! `null`, or nothing at all. These functions accept any of that and return
//! either a usable value or `None`. They never fail.

use serde_json::Value;

/// Normalize a remote value to a finite number.
///
/// Finite JSON numbers and strings holding a finite number (surrounding
/// whitespace allowed) map to that number. Everything else maps to `None`:
/// missing values, `null`, empty strings, `"NaN"`, `"inf"`, booleans,
/// arrays and objects.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use vitalsync_types::normalize::normalize_number;
///
/// assert_eq!(normalize_number(Some(&json!(" 36.6 "))), Some(36.6));
/// assert_eq!(normalize_number(Some(&json!("warming up"))), None);
/// assert_eq!(normalize_number(None), None);
/// ```
pub fn normalize_number(raw: Option<&Value>) -> Option<f64> {
    let n = match raw? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    n.is_finite().then_some(n)
}

/// Normalize a remote value to non-empty text.
///
/// Strings are trimmed; a string that is empty after trimming, and any
/// non-string value, maps to `None`.
pub fn normalize_text(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// Look up `key` in an object value.
///
/// A missing or non-object value has no fields.
pub fn field<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    value?.as_object()?.get(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finite_numbers_pass_through() {
        assert_eq!(normalize_number(Some(&json!(72))), Some(72.0));
        assert_eq!(normalize_number(Some(&json!(37.2))), Some(37.2));
        assert_eq!(normalize_number(Some(&json!(-4.5))), Some(-4.5));
        assert_eq!(normalize_number(Some(&json!(0))), Some(0.0));
    }

    #[test]
    fn numeric_strings_are_parsed() {
        assert_eq!(normalize_number(Some(&json!("72"))), Some(72.0));
        assert_eq!(normalize_number(Some(&json!("  98.5\n"))), Some(98.5));
        assert_eq!(normalize_number(Some(&json!("1e2"))), Some(100.0));
    }

    #[test]
    fn non_finite_strings_are_absent() {
        for raw in ["NaN", "nan", "inf", "-inf", "Infinity", "-Infinity"] {
            assert_eq!(normalize_number(Some(&json!(raw))), None, "{raw}");
        }
    }

    #[test]
    fn non_numeric_strings_are_absent() {
        for raw in ["", "   ", "abc", "72bpm", "--"] {
            assert_eq!(normalize_number(Some(&json!(raw))), None, "{raw:?}");
        }
    }

    #[test]
    fn other_shapes_are_absent() {
        assert_eq!(normalize_number(None), None);
        assert_eq!(normalize_number(Some(&Value::Null)), None);
        assert_eq!(normalize_number(Some(&json!(true))), None);
        assert_eq!(normalize_number(Some(&json!([72]))), None);
        assert_eq!(normalize_number(Some(&json!({ "bpm": 72 }))), None);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            normalize_text(Some(&json!("  my chest hurts  "))),
            Some("my chest hurts".to_string())
        );
    }

    #[test]
    fn empty_or_non_string_text_is_absent() {
        assert_eq!(normalize_text(Some(&json!(""))), None);
        assert_eq!(normalize_text(Some(&json!(" \t "))), None);
        assert_eq!(normalize_text(Some(&json!(42))), None);
        assert_eq!(normalize_text(Some(&Value::Null)), None);
        assert_eq!(normalize_text(None), None);
    }

    #[test]
    fn field_lookup_tolerates_non_objects() {
        let heart = json!({ "bpm": "72", "spo2": 98 });
        assert_eq!(field(Some(&heart), "spo2"), Some(&json!(98)));
        assert_eq!(field(Some(&heart), "temperature"), None);
        assert_eq!(field(Some(&json!("72")), "bpm"), None);
        assert_eq!(field(None, "bpm"), None);
    }
}
