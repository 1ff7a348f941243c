//! Walks the node tree against a message.

use serde_json::Value;

use super::format::format_datum;
use super::funcs;
use super::parse::{Arg, Branch, Command, Node, Pipe};
use crate::message::type_name;

/// Result of evaluating an argument or pipeline.
///
/// `Missing` is what a lookup of an absent key produces; it prints as
/// `<no value>` and is distinct from an explicit JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Datum {
    Missing,
    Value(Value),
}

impl Datum {
    pub(crate) fn as_value(&self) -> Option<&Value> {
        match self {
            Datum::Missing => None,
            Datum::Value(v) => Some(v),
        }
    }

    /// Falsy: missing, null, false, 0, "", empty array or object.
    pub(crate) fn is_true(&self) -> bool {
        match self {
            Datum::Missing | Datum::Value(Value::Null) => false,
            Datum::Value(Value::Bool(b)) => *b,
            Datum::Value(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Datum::Value(Value::String(s)) => !s.is_empty(),
            Datum::Value(Value::Array(items)) => !items.is_empty(),
            Datum::Value(Value::Object(map)) => !map.is_empty(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Datum::Missing => "no value",
            Datum::Value(v) => type_name(v),
        }
    }
}

/// Evaluation state for one render.
pub(crate) struct State<'a> {
    root: &'a Value,
    out: String,
}

impl<'a> State<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self {
            root,
            out: String::new(),
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    pub(crate) fn walk(&mut self, nodes: &[Node], dot: &Datum) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipe(pipe, dot)?;
                    self.out.push_str(&format_datum(&value));
                }
                Node::If(branch) => {
                    if self.eval_pipe(&branch.pipe, dot)?.is_true() {
                        self.walk(&branch.body, dot)?;
                    } else {
                        self.walk(&branch.otherwise, dot)?;
                    }
                }
                Node::With(branch) => {
                    let value = self.eval_pipe(&branch.pipe, dot)?;
                    if value.is_true() {
                        self.walk(&branch.body, &value)?;
                    } else {
                        self.walk(&branch.otherwise, dot)?;
                    }
                }
                Node::Range(branch) => self.walk_range(branch, dot)?,
            }
        }
        Ok(())
    }

    fn walk_range(&mut self, branch: &Branch, dot: &Datum) -> Result<(), String> {
        let value = self.eval_pipe(&branch.pipe, dot)?;
        let elements: Vec<Value> = match &value {
            Datum::Missing | Datum::Value(Value::Null) => Vec::new(),
            Datum::Value(Value::Array(items)) => items.clone(),
            Datum::Value(Value::Object(map)) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter().map(|k| map[k].clone()).collect()
            }
            other => return Err(format!("range can't iterate over {}", other.kind())),
        };
        if elements.is_empty() {
            return self.walk(&branch.otherwise, dot);
        }
        for element in elements {
            self.walk(&branch.body, &Datum::Value(element))?;
        }
        Ok(())
    }

    pub(crate) fn eval_pipe(&mut self, pipe: &Pipe, dot: &Datum) -> Result<Datum, String> {
        let mut last: Option<Datum> = None;
        for command in &pipe.commands {
            last = Some(self.eval_command(command, dot, last)?);
        }
        Ok(last.unwrap_or(Datum::Missing))
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Datum,
        piped: Option<Datum>,
    ) -> Result<Datum, String> {
        match command.args.first() {
            Some(Arg::Func(name)) => funcs::call(self, name, &command.args[1..], dot, piped),
            Some(arg) => {
                if command.args.len() > 1 || piped.is_some() {
                    return Err(format!("can't give argument to non-function {:?}", arg));
                }
                self.eval_arg(arg, dot)
            }
            None => Err("missing value for command".to_string()),
        }
    }

    pub(crate) fn eval_arg(&mut self, arg: &Arg, dot: &Datum) -> Result<Datum, String> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Field(chain) => lookup(dot.as_value(), chain),
            Arg::Root(chain) => lookup(Some(self.root), chain),
            Arg::Literal(value) => Ok(Datum::Value(value.clone())),
            Arg::Nil => Ok(Datum::Value(Value::Null)),
            Arg::Func(name) => funcs::call(self, name, &[], dot, None),
            Arg::Sub(pipe) => self.eval_pipe(pipe, dot),
        }
    }
}

/// Follow a field chain. Absent keys yield `Missing`, and so does any access
/// past a missing value; stepping into `null` or a non-object is an error.
fn lookup(start: Option<&Value>, chain: &[String]) -> Result<Datum, String> {
    let mut current = start;
    for name in chain {
        current = match current {
            None => return Ok(Datum::Missing),
            Some(Value::Object(map)) => map.get(name),
            Some(Value::Null) => {
                return Err(format!("nil pointer evaluating interface {{}}.{}", name));
            }
            Some(other) => {
                return Err(format!(
                    "can't evaluate field {} in type {}",
                    name,
                    type_name(other)
                ));
            }
        };
    }
    Ok(current.map_or(Datum::Missing, |v| Datum::Value(v.clone())))
}
