//! Legacy metadata values.
//!
//! Legacy rows store text. Scalars are kept as-is and complex values (lists,
//! maps) are stored serialized, so a read has to decode whatever a writer left.

use serde_json::Value;

/// A legacy metadata value as seen by callers of the metadata protocol.
pub type MetaValue = Value;

/// Encodes a value for a legacy text row.
#[must_use]
pub fn maybe_serialize(value: &MetaValue) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Decodes a legacy text row. Serialized arrays and objects come back as
/// structured values, everything else as a string.
#[must_use]
pub fn maybe_unserialize(raw: &str) -> MetaValue {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// Whether a value counts as "nothing stored".
#[must_use]
pub fn is_empty(value: &MetaValue) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Text form of a scalar value. Arrays and objects have no text form.
#[must_use]
pub fn as_text(value: &MetaValue) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parses a scalar as an integer, accepting numeric strings such as `"12"` or `"12.0"`.
#[must_use]
pub fn as_i64(value: &MetaValue) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parses a scalar as a float. Empty strings are `None`.
#[must_use]
pub fn as_f64(value: &MetaValue) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Reads a list of ids from an array (`[12, "13"]`) or a comma-separated
/// string (`"12,13"`). Zero and unparsable entries are dropped.
#[must_use]
pub fn as_id_list(value: &MetaValue) -> Vec<i64> {
    let ids: Vec<i64> = match value {
        Value::Array(items) => items.iter().filter_map(as_i64).collect(),
        Value::String(s) => s
            .split(',')
            .filter_map(|part| as_i64(&Value::String(part.to_string())))
            .collect(),
        Value::Number(_) => as_i64(value).into_iter().collect(),
        Value::Null | Value::Bool(_) | Value::Object(_) => Vec::new(),
    };
    ids.into_iter().filter(|id| *id > 0).collect()
}

/// Renders a float the way legacy rows store numbers: no trailing `.0`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Sanitizes a display name into a slug: lowercase, spaces and
/// punctuation collapsed into single dashes.
#[must_use]
pub fn sanitize_title(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_keeps_scalars_raw() {
        assert_eq!(maybe_serialize(&json!("DUMMY SKU")), "DUMMY SKU");
        assert_eq!(maybe_serialize(&json!(7)), "7");
        assert_eq!(maybe_serialize(&json!([20, 30])), "[20,30]");
    }

    #[test]
    fn test_unserialize_decodes_only_complex_values() {
        assert_eq!(maybe_unserialize("[20,30]"), json!([20, 30]));
        assert_eq!(maybe_unserialize(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(maybe_unserialize("20"), json!("20"));
        assert_eq!(maybe_unserialize("[not json"), json!("[not json"));
    }

    #[test]
    fn test_id_lists() {
        assert_eq!(as_id_list(&json!([20, "30", 0])), vec![20, 30]);
        assert_eq!(as_id_list(&json!("12, 13,")), vec![12, 13]);
        assert!(as_id_list(&json!("")).is_empty());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(20.0), "20");
        assert_eq!(format_number(10.5), "10.5");
        assert_eq!(as_i64(&json!("7")), Some(7));
        assert_eq!(as_i64(&json!("7.0")), Some(7));
        assert_eq!(as_f64(&json!("")), None);
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Frame Size"), "frame-size");
        assert_eq!(sanitize_title("  Color / Finish "), "color-finish");
    }
}
