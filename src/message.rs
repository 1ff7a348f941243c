//! Generic message model.
//!
//! A message is any JSON value. Every number that enters the engine is held as
//! a double-precision float so that `3` and `3.0` compare equal everywhere in
//! the pipeline. Numbers are narrowed back to integer literals only when a
//! message leaves the engine.

use serde_json::{Map, Number, Value};

/// A dynamically-typed JSON value flowing through the pipeline.
pub type Message = Value;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Keys consulted, in order, when picking a human-readable label for a message.
const LABEL_KEYS: [&str; 4] = ["fqdn", "uid", "name", "id"];

/// Convert every number in `value` to its f64 representation, in place.
pub fn widen(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if !n.is_f64() {
                if let Some(f) = n.as_f64().and_then(Number::from_f64) {
                    *n = f;
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(widen),
        Value::Object(map) => map.values_mut().for_each(widen),
        _ => {}
    }
}

/// Return a widened copy of `value`.
pub fn widened(mut value: Value) -> Value {
    widen(&mut value);
    value
}

/// Independent copy of a message with all numbers widened to f64.
///
/// Equivalent to a serialize/deserialize round trip: the copy shares nothing
/// with the original, and integer literals come back as floats.
pub fn deep_copy(message: &Message) -> Message {
    widened(message.clone())
}

/// Return a copy of `value` where integral floats within the exactly
/// representable range are written as integers.
pub fn narrowed(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER => {
                Value::Number(Number::from(f as i64))
            }
            _ => Value::Number(n.clone()),
        },
        Value::Array(items) => Value::Array(items.iter().map(narrowed).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), narrowed(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Structural equality that compares numbers by their f64 value, so an
/// unwidened `100` equals a widened `100.0`.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equivalent(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| equivalent(x, y)))
        }
        _ => a == b,
    }
}

/// Encode a message for the outside world.
pub fn to_json_string(message: &Message) -> Result<String, serde_json::Error> {
    serde_json::to_string(&narrowed(message))
}

/// Decode an input document into its messages.
///
/// A top-level array yields one message per element; anything else is a
/// single message.
pub fn decode_document(bytes: &[u8]) -> Result<Vec<Message>, serde_json::Error> {
    let document: Value = serde_json::from_slice(bytes)?;
    Ok(match widened(document) {
        Value::Array(items) => items,
        single => vec![single],
    })
}

/// Human-readable label used in logs and audit reports.
///
/// Objects are labelled by the first of `fqdn`, `uid`, `name` or `id` that is
/// present; everything else falls back to the formatted message.
pub fn message_label(message: &Message) -> String {
    if let Value::Object(map) = message {
        for key in LABEL_KEYS {
            if let Some(value) = map.get(key) {
                return match value {
                    Value::String(s) => s.clone(),
                    other => crate::template::format_value(other),
                };
            }
        }
    }
    crate::template::format_value(message)
}

/// Short type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_widen_makes_integers_equal_to_floats() {
        let value = widened(json!({"port": 100, "nested": [1, {"x": 2}]}));
        assert_eq!(value, json!({"port": 100.0, "nested": [1.0, {"x": 2.0}]}));
        assert_ne!(json!(100), json!(100.0));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = json!({"a": {"b": 1}});
        let mut copy = deep_copy(&original);
        copy["a"]["b"] = json!("changed");

        assert_eq!(original, json!({"a": {"b": 1}}));
        assert_eq!(copy["a"]["b"], json!("changed"));
    }

    #[test]
    fn test_equivalent_ignores_number_representation() {
        assert!(equivalent(&json!({"a": [100]}), &json!({"a": [100.0]})));
        assert!(!equivalent(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!equivalent(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_narrowed_output() {
        let value = widened(json!({"port": 8993, "ratio": 0.5}));
        assert_eq!(to_json_string(&value).unwrap(), r#"{"port":8993,"ratio":0.5}"#);
    }

    #[test]
    fn test_decode_document_array_and_object() {
        let messages = decode_document(br#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(messages, vec![json!({"a": 1.0}), json!({"a": 2.0})]);

        let single = decode_document(br#"{"a": 1}"#).unwrap();
        assert_eq!(single, vec![json!({"a": 1.0})]);

        assert!(decode_document(b"not json").is_err());
    }

    #[test]
    fn test_message_label() {
        assert_eq!(message_label(&json!({"name": "gw-1", "id": 7})), "gw-1");
        assert_eq!(message_label(&json!({"uid": 42.0})), "42");
        assert_eq!(message_label(&json!({"fqdn": "a.example", "name": "a"})), "a.example");
        assert_eq!(message_label(&json!("plain")), "plain");
    }
}
