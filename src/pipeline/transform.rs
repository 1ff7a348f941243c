//! Transform processor: rewrites individual fields of an object.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use super::{deserialize_scalar_map, Operation, ProcessError, Session};
use crate::message::{equivalent, type_name, Message};
use crate::report::Reporter;
use crate::template::{self, Coerced};

/// Sets fields of an object message from templates.
///
/// Fields are evaluated in configured order against the current message, so a
/// template sees the writes of the fields before it. A template that renders to
/// `nil` removes its field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transform {
    /// Field name -> template
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub fields: IndexMap<String, String>,
}

impl Operation for Transform {
    fn process(
        &self,
        session: &mut Session<'_>,
        mut message: Message,
    ) -> Result<Option<Message>, ProcessError> {
        let reporter = session.reporter("transform")?;
        if !message.is_object() {
            return Err(mismatch(&message));
        }

        for (field, source) in &self.fields {
            let coerced = template::evaluate(source, &message)?;
            if let Value::Object(map) = &mut message {
                apply(map, reporter, field, coerced);
            }
        }

        Ok(Some(message))
    }

    fn templates(&self) -> Vec<&str> {
        self.fields.values().map(String::as_str).collect()
    }
}

fn mismatch(message: &Message) -> ProcessError {
    ProcessError::TypeMismatch {
        processor: "transform",
        expected: "an object",
        actual: type_name(message),
    }
}

/// Write one evaluated field into `map`, recording the change if any.
fn apply(map: &mut JsonMap<String, Value>, reporter: &mut Reporter, field: &str, coerced: Coerced) {
    match coerced {
        Coerced::Nil => {
            if let Some(before) = map.remove(field) {
                tracing::debug!(field, "removing field");
                reporter.change(field, Some(before), None);
            }
        }
        Coerced::Value(after) => {
            let unchanged = map.get(field).is_some_and(|current| equivalent(current, &after));
            if !unchanged {
                tracing::debug!(field, value = %after, "setting field");
                let before = map.insert(field.to_string(), after.clone());
                reporter.change(field, before, Some(after));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Change, Disposition};
    use serde_json::json;

    fn transform(fields: &[(&str, &str)]) -> Transform {
        Transform {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn run(transform: &Transform, input: Value) -> (Value, Reporter) {
        let mut reporter = Reporter::new("test");
        let output = transform
            .process(&mut Session::new(&mut reporter), input)
            .unwrap()
            .unwrap();
        (output, reporter)
    }

    #[test]
    fn test_sets_typed_values() {
        let t = transform(&[
            ("udpEnabled", "true"),
            ("port", "8993"),
            ("label", "{{ .name }}-gw"),
            ("tags", r#"{"a": 1}"#),
        ]);
        let (output, reporter) = run(&t, json!({"name": "bambi"}));

        assert_eq!(
            output,
            json!({
                "name": "bambi",
                "udpEnabled": true,
                "port": 8993.0,
                "label": "bambi-gw",
                "tags": {"a": 1.0},
            })
        );
        assert_eq!(reporter.changes().len(), 4);
        assert_eq!(
            reporter.changes()[0],
            Change {
                field: "udpEnabled".to_string(),
                before: None,
                after: Some(json!(true)),
            }
        );
    }

    #[test]
    fn test_same_value_records_nothing() {
        let t = transform(&[("port", "100"), ("name", "{{ .name }}")]);
        let (output, reporter) = run(&t, json!({"port": 100, "name": "x"}));
        assert_eq!(output, json!({"port": 100, "name": "x"}));
        assert_eq!(reporter.disposition(), Disposition::Noop);

        let (_, reporter) = run(&t, json!({"port": 100.0, "name": "x"}));
        assert!(reporter.changes().is_empty());
    }

    #[test]
    fn test_sentinel_removes_field() {
        let t = transform(&[(
            "deleted",
            r#"{{ if eq .deleted "deleteme" }}nil{{else}}{{.deleted}}{{end}}"#,
        )]);

        let (output, reporter) = run(&t, json!({"deleted": "deleteme", "kept": 1.0}));
        assert_eq!(output, json!({"kept": 1.0}));
        assert_eq!(
            reporter.changes(),
            &[Change {
                field: "deleted".to_string(),
                before: Some(json!("deleteme")),
                after: None,
            }]
        );

        let (output, reporter) = run(&transform(&[("absent", "nil")]), json!({"a": 1.0}));
        assert_eq!(output, json!({"a": 1.0}));
        assert!(reporter.changes().is_empty());
    }

    #[test]
    fn test_earlier_writes_are_visible() {
        let t = transform(&[("a", "first"), ("b", "{{ .a }}-second")]);
        let (output, _) = run(&t, json!({}));
        assert_eq!(output, json!({"a": "first", "b": "first-second"}));
    }

    #[test]
    fn test_conditional_rewrite() {
        let t = transform(&[(
            "maxClientWriteMbps",
            r#"{{ if and (eq .protocol "udp") (eq .maxClientWriteMbps 0.0) }}nil{{else}}{{.maxClientWriteMbps}}{{end}}"#,
        )]);

        let (output, reporter) = run(&t, json!({"protocol": "udp", "maxClientWriteMbps": 0.0}));
        assert_eq!(output, json!({"protocol": "udp"}));
        assert_eq!(reporter.disposition(), Disposition::Changed);

        let (output, reporter) = run(&t, json!({"protocol": "tcp", "maxClientWriteMbps": 5.0}));
        assert_eq!(output, json!({"protocol": "tcp", "maxClientWriteMbps": 5.0}));
        assert_eq!(reporter.disposition(), Disposition::Noop);
    }

    #[test]
    fn test_rejects_non_objects() {
        let mut reporter = Reporter::new("test");
        let result = transform(&[("a", "1")]).process(&mut Session::new(&mut reporter), json!([1]));
        assert_eq!(
            result,
            Err(ProcessError::TypeMismatch {
                processor: "transform",
                expected: "an object",
                actual: "array",
            })
        );
    }

    #[test]
    fn test_requires_reporter() {
        let result = transform(&[]).process(&mut Session::detached(), json!({}));
        assert_eq!(result, Err(ProcessError::MissingContext { processor: "transform" }));
    }
}
