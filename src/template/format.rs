//! Text form of values, matching how the template language prints them.

use serde_json::Value;

use super::exec::Datum;

/// Format a value the way an action prints it.
///
/// Strings are raw, numbers use the shortest `%v` float form (`8993`, `1.5`,
/// `1e+06`), null prints as `<nil>`, arrays as `[a b]` and objects as
/// `map[k:v]` with sorted keys.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_float),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", k, format_value(v)))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

pub(crate) fn format_datum(datum: &Datum) -> String {
    match datum {
        Datum::Missing => "<no value>".to_string(),
        Datum::Value(value) => format_value(value),
    }
}

/// Shortest round-tripping representation, switching to exponent form when the
/// decimal exponent is below -4 or at least 6.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:e}", f);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..6).contains(&exponent) {
        format!("{}", f)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}
