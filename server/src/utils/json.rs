//! JSON utility functions

use serde_json::Value as JsonValue;

/// Numeric value of a JSON leaf, accepting numbers and numeric strings.
///
/// Anything else (including non-finite values) yields 0.
pub fn safe_to_number(value: Option<&JsonValue>) -> f64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Some(JsonValue::String(s)) if !s.trim().is_empty() => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Converts a counter that went through floating point back to an integer.
pub fn to_counter(value: f64) -> i64 {
    if value.is_finite() { value.round() as i64 } else { 0 }
}

/// First `limit` keys of a JSON object, empty for other shapes.
pub fn object_key_sample(value: Option<&JsonValue>, limit: usize) -> Vec<String> {
    match value {
        Some(JsonValue::Object(map)) => map.keys().take(limit).cloned().collect(),
        _ => Vec::new(),
    }
}
