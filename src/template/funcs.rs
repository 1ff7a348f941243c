//! Builtin template functions.

use std::cmp::Ordering;

use serde_json::Value;

use super::exec::{Datum, State};
use super::format::format_value;
use super::parse::Arg;

const BUILTINS: [&str; 15] = [
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print",
    "hasPrefix", "hasSuffix", "contains",
];

/// Whether `name` is a callable builtin.
pub(crate) fn is_defined(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Call builtin `name`. `piped` is the result of the previous command in the
/// pipeline, passed as the final argument.
pub(crate) fn call(
    state: &mut State<'_>,
    name: &str,
    args: &[Arg],
    dot: &Datum,
    piped: Option<Datum>,
) -> Result<Datum, String> {
    match name {
        "and" | "or" => return short_circuit(state, name == "and", args, dot, piped),
        _ => {}
    }

    let mut values = Vec::with_capacity(args.len() + 1);
    for arg in args {
        values.push(state.eval_arg(arg, dot)?);
    }
    values.extend(piped);

    match name {
        "not" => {
            let [value] = expect_args::<1>(name, values)?;
            Ok(boolean(!value.is_true()))
        }
        "eq" => {
            if values.len() < 2 {
                return Err(format!("wrong number of args for eq: want at least 2 got {}", values.len()));
            }
            let first = &values[0];
            for other in &values[1..] {
                if equal(first, other)? {
                    return Ok(boolean(true));
                }
            }
            Ok(boolean(false))
        }
        "ne" => {
            let [a, b] = expect_args::<2>(name, values)?;
            Ok(boolean(!equal(&a, &b)?))
        }
        "lt" => ordered(name, values, |o| o == Ordering::Less),
        "le" => ordered(name, values, |o| o != Ordering::Greater),
        "gt" => ordered(name, values, |o| o == Ordering::Greater),
        "ge" => ordered(name, values, |o| o != Ordering::Less),
        "len" => {
            let [value] = expect_args::<1>(name, values)?;
            let len = match value.as_value() {
                Some(Value::String(s)) => s.len(),
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                _ => return Err(format!("len of {}", value.kind())),
            };
            Ok(Datum::Value(Value::from(len as f64)))
        }
        "index" => {
            let mut values = values.into_iter();
            let item = values
                .next()
                .ok_or_else(|| "wrong number of args for index: want at least 1 got 0".to_string())?;
            values.try_fold(item, |item, key| index(item, &key))
        }
        "print" => {
            let mut out = String::new();
            let mut previous_was_string = true;
            for (i, value) in values.iter().enumerate() {
                let is_string = matches!(value, Datum::Value(Value::String(_)));
                if i > 0 && !is_string && !previous_was_string {
                    out.push(' ');
                }
                // A missing key reaches a function as a nil argument
                match value {
                    Datum::Missing => out.push_str(&format_value(&Value::Null)),
                    Datum::Value(v) => out.push_str(&format_value(v)),
                }
                previous_was_string = is_string;
            }
            Ok(Datum::Value(Value::String(out)))
        }
        "hasPrefix" => strings(name, values, |s, affix| s.starts_with(affix)),
        "hasSuffix" => strings(name, values, |s, affix| s.ends_with(affix)),
        "contains" => strings(name, values, |s, needle| s.contains(needle)),
        other => Err(format!("function {:?} not defined", other)),
    }
}

fn boolean(b: bool) -> Datum {
    Datum::Value(Value::Bool(b))
}

fn expect_args<const N: usize>(name: &str, values: Vec<Datum>) -> Result<[Datum; N], String> {
    let got = values.len();
    values
        .try_into()
        .map_err(|_| format!("wrong number of args for {}: want {} got {}", name, N, got))
}

/// `and` returns the first falsy operand (or the last), `or` the first truthy
/// one (or the last). Later operands are not evaluated.
fn short_circuit(
    state: &mut State<'_>,
    is_and: bool,
    args: &[Arg],
    dot: &Datum,
    piped: Option<Datum>,
) -> Result<Datum, String> {
    let name = if is_and { "and" } else { "or" };
    if args.is_empty() && piped.is_none() {
        return Err(format!("wrong number of args for {}: want at least 1 got 0", name));
    }
    let mut last = Datum::Missing;
    for arg in args {
        last = state.eval_arg(arg, dot)?;
        if last.is_true() != is_and {
            return Ok(last);
        }
    }
    if let Some(value) = piped {
        last = value;
    }
    Ok(last)
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Equality on basic values. Null and missing equal only each other.
fn equal(a: &Datum, b: &Datum) -> Result<bool, String> {
    let (a, b) = match (a.as_value(), b.as_value()) {
        (None | Some(Value::Null), None | Some(Value::Null)) => return Ok(true),
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => return Ok(false),
        (Some(a), Some(b)) => (a, b),
    };
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Number(_), Value::Number(_)) => Ok(number(a) == number(b)),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            Err("non-comparable type".to_string())
        }
        _ => Err("incompatible types for comparison".to_string()),
    }
}

fn ordered(
    name: &str,
    values: Vec<Datum>,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Datum, String> {
    let [a, b] = expect_args::<2>(name, values)?;
    let ordering = match (a.as_value(), b.as_value()) {
        (Some(Value::Number(_)), Some(Value::Number(_))) => {
            let (x, y) = (a.as_value().and_then(number), b.as_value().and_then(number));
            x.partial_cmp(&y)
                .ok_or_else(|| "incomparable numbers".to_string())?
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(_) | Value::String(_)), Some(Value::Number(_) | Value::String(_))) => {
            return Err("incompatible types for comparison".to_string());
        }
        _ => {
            return Err(format!(
                "invalid type for comparison: {} and {}",
                a.kind(),
                b.kind()
            ));
        }
    };
    Ok(boolean(accept(ordering)))
}

fn index(item: Datum, key: &Datum) -> Result<Datum, String> {
    match (item.as_value(), key.as_value()) {
        (Some(Value::Array(items)), Some(Value::Number(n))) => {
            let position = n.as_f64().unwrap_or(-1.0);
            if position < 0.0 || position.fract() != 0.0 || position as usize >= items.len() {
                return Err(format!("index out of range: {}", position));
            }
            Ok(Datum::Value(items[position as usize].clone()))
        }
        (Some(Value::Object(map)), Some(Value::String(k))) => {
            Ok(map.get(k).map_or(Datum::Missing, |v| Datum::Value(v.clone())))
        }
        (None | Some(Value::Null), _) => Err("index of untyped nil".to_string()),
        _ => Err(format!("can't index item of type {} with {}", item.kind(), key.kind())),
    }
}

fn strings(
    name: &str,
    values: Vec<Datum>,
    test: impl Fn(&str, &str) -> bool,
) -> Result<Datum, String> {
    let [s, affix] = expect_args::<2>(name, values)?;
    match (s.as_value(), affix.as_value()) {
        (Some(Value::String(s)), Some(Value::String(affix))) => Ok(boolean(test(s, affix))),
        _ => Err(format!(
            "wrong type for {}: expected string and string; got {} and {}",
            name,
            s.kind(),
            affix.kind()
        )),
    }
}
