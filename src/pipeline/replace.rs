//! Replace processor: builds a new object from templates.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use super::{deserialize_scalar_map, Operation, ProcessError, Session};
use crate::message::Message;
use crate::template;

/// Replaces the message with an object whose fields are rendered from the
/// incoming message.
///
/// Every template sees the message as it entered the processor. A template
/// rendering to `nil` yields the string `"nil"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Replace {
    /// Output field -> template
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub template: IndexMap<String, String>,
}

impl Operation for Replace {
    fn process(
        &self,
        _session: &mut Session<'_>,
        message: Message,
    ) -> Result<Option<Message>, ProcessError> {
        let mut out = JsonMap::new();
        for (field, source) in &self.template {
            let value = template::evaluate(source, &message)?.into_value();
            out.insert(field.clone(), value);
        }
        Ok(Some(Value::Object(out)))
    }

    fn templates(&self) -> Vec<&str> {
        self.template.values().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn replace(pairs: &[(&str, &str)]) -> Replace {
        Replace {
            template: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_static_values() {
        let output = replace(&[("hi", "five")])
            .process(&mut Session::detached(), json!({"foo": "bar"}))
            .unwrap();
        assert_eq!(output, Some(json!({"hi": "five"})));
    }

    #[test]
    fn test_sources_from_input_only() {
        let output = replace(&[("hi", "{{.foo}}")])
            .process(&mut Session::detached(), json!({"foo": "bar", "other": 1.0}))
            .unwrap();
        assert_eq!(output, Some(json!({"hi": "bar"})));
    }

    #[test]
    fn test_templates_see_original_input() {
        let output = replace(&[("foo", "replaced"), ("copy", "{{.foo}}")])
            .process(&mut Session::detached(), json!({"foo": "original"}))
            .unwrap();
        assert_eq!(output, Some(json!({"foo": "replaced", "copy": "original"})));
    }

    #[test]
    fn test_nil_is_a_plain_string() {
        let output = replace(&[("gone", "nil")])
            .process(&mut Session::detached(), json!({}))
            .unwrap();
        assert_eq!(output, Some(json!({"gone": "nil"})));
    }

    #[test]
    fn test_non_object_input() {
        let output = replace(&[("value", "{{.}}"), ("n", "123")])
            .process(&mut Session::detached(), json!("text"))
            .unwrap();
        assert_eq!(output, Some(json!({"value": "text", "n": 123.0})));
    }
}
