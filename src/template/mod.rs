//! Template expressions rendered against messages.
//!
//! Every processor that computes a value does it through a template: the
//! expression is rendered to text with the message as its context, and the text
//! is then coerced to a typed value:
//!
//! 1. text that parses as JSON becomes that JSON value (numbers widened to f64)
//! 2. anything else becomes a string with surrounding whitespace trimmed
//! 3. the trimmed text `nil` is the deletion sentinel
//!
//! ## Example
//!
//! ```
//! use jsonplan::template::{Template, Coerced};
//! use serde_json::json;
//!
//! let template = Template::parse(r#"{{if hasPrefix .protocol "udp"}}true{{else}}false{{end}}"#).unwrap();
//! let value = template.evaluate(&json!({"protocol": "udp"})).unwrap();
//! assert_eq!(value, Coerced::Value(json!(true)));
//! ```

mod exec;
mod format;
mod funcs;
mod lex;
mod parse;

use std::fmt;

use serde_json::Value;

use crate::message::{widened, Message};

pub use format::format_value;

/// Trimmed rendered text that means "no value".
pub const NIL_SENTINEL: &str = "nil";

/// How a removed value is shown in change records.
pub const NO_VALUE: &str = "<no value>";

/// Error type for template parsing and rendering
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// The expression is not syntactically valid
    Parse { template: String, reason: String },
    /// The expression could not be rendered against the given message
    Execute { template: String, reason: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Parse { template, reason } => {
                write!(f, "parsing template {:?}: {}", template, reason)
            }
            TemplateError::Execute { template, reason } => {
                write!(f, "executing template {:?}: {}", template, reason)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Result of evaluating a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// A typed value
    Value(Message),
    /// The deletion sentinel
    Nil,
}

impl Coerced {
    /// Collapse to a value, keeping the sentinel as the literal string `nil`.
    ///
    /// Used by callers that have no notion of deleting a field.
    pub fn into_value(self) -> Message {
        match self {
            Coerced::Value(value) => value,
            Coerced::Nil => Value::String(NIL_SENTINEL.to_string()),
        }
    }
}

/// Coerce rendered text to a typed value.
pub fn coerce(rendered: &str) -> Coerced {
    match serde_json::from_str::<Value>(rendered) {
        Ok(value) => Coerced::Value(widened(value)),
        Err(_) => {
            let trimmed = rendered.trim();
            if trimmed == NIL_SENTINEL {
                Coerced::Nil
            } else {
                Coerced::Value(Value::String(trimmed.to_string()))
            }
        }
    }
}

/// A parsed template expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<parse::Node>,
}

impl Template {
    /// Parse a template expression.
    ///
    /// # Errors
    /// Returns `TemplateError::Parse` for unbalanced actions, unknown functions,
    /// malformed literals and unsupported constructs.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let nodes = lex::lex(source)
            .and_then(|items| parse::parse(&items))
            .map_err(|reason| TemplateError::Parse {
                template: source.to_string(),
                reason,
            })?;
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    /// Render the template with `data` as both dot and root (`$`).
    pub fn render(&self, data: &Message) -> Result<String, TemplateError> {
        let mut state = exec::State::new(data);
        state
            .walk(&self.nodes, &exec::Datum::Value(data.clone()))
            .map_err(|reason| TemplateError::Execute {
                template: self.source.clone(),
                reason,
            })?;
        Ok(state.finish())
    }

    /// Render and coerce.
    pub fn evaluate(&self, data: &Message) -> Result<Coerced, TemplateError> {
        Ok(coerce(&self.render(data)?))
    }
}

/// Parse and render `source` in one step.
pub fn render(source: &str, data: &Message) -> Result<String, TemplateError> {
    Template::parse(source)?.render(data)
}

/// Parse, render and coerce `source` in one step.
pub fn evaluate(source: &str, data: &Message) -> Result<Coerced, TemplateError> {
    Template::parse(source)?.evaluate(data)
}
