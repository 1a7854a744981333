//! Built-in and extension functions.
//!
//! The standard set follows the usual JMESPath function library. The
//! extensions add conditional selection, integer ranges, JSON
//! (de)serialization, content hashing, deterministic UUIDs and regular
//! expressions. All of them are pure.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

use super::ast::Ast;
use super::interpreter::{interpret, json_cmp, json_eq};
use crate::{is_truthy, EvalError};

static NULL: Value = Value::Null;

/// Largest array `range` may produce.
const RANGE_LIMIT: usize = 100_000;

/// An evaluated function argument.
pub enum Arg<'a> {
    Value(Value),
    Expref(&'a Ast),
}

/// Convert an `f64` result back to JSON, preferring integers.
pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Argument accessors that report the function name and position on misuse.
struct Args<'a> {
    name: &'a str,
    args: Vec<Arg<'a>>,
}

impl<'a> Args<'a> {
    fn arity(&self, min: usize, max: usize, expected: &'static str) -> Result<(), EvalError> {
        if (min..=max).contains(&self.args.len()) {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: self.name.to_owned(),
                expected,
                actual: self.args.len(),
            })
        }
    }

    fn invalid(&self, position: usize, expected: &'static str, actual: &'static str) -> EvalError {
        EvalError::InvalidType {
            name: self.name.to_owned(),
            position,
            expected,
            actual,
        }
    }

    fn failed(&self, message: impl Into<String>) -> EvalError {
        EvalError::Function {
            name: self.name.to_owned(),
            message: message.into(),
        }
    }

    fn value(&self, position: usize) -> Result<&Value, EvalError> {
        match self.args.get(position) {
            Some(Arg::Value(value)) => Ok(value),
            Some(Arg::Expref(_)) => Err(self.invalid(position, "a value", "expression")),
            None => Ok(&NULL),
        }
    }

    fn expref(&self, position: usize) -> Result<&'a Ast, EvalError> {
        match self.args.get(position) {
            Some(Arg::Expref(ast)) => Ok(*ast),
            Some(Arg::Value(value)) => Err(self.invalid(position, "an expression", type_name(value))),
            None => Err(self.invalid(position, "an expression", "null")),
        }
    }

    fn number(&self, position: usize) -> Result<f64, EvalError> {
        let value = self.value(position)?;
        value
            .as_f64()
            .ok_or_else(|| self.invalid(position, "a number", type_name(value)))
    }

    fn integer(&self, position: usize) -> Result<i64, EvalError> {
        let n = self.number(position)?;
        if n.fract() == 0.0 {
            Ok(n as i64)
        } else {
            Err(self.invalid(position, "an integer", "number"))
        }
    }

    fn string(&self, position: usize) -> Result<&str, EvalError> {
        let value = self.value(position)?;
        value
            .as_str()
            .ok_or_else(|| self.invalid(position, "a string", type_name(value)))
    }

    fn array(&self, position: usize) -> Result<&Vec<Value>, EvalError> {
        let value = self.value(position)?;
        value
            .as_array()
            .ok_or_else(|| self.invalid(position, "an array", type_name(value)))
    }

    fn object(&self, position: usize) -> Result<&Map<String, Value>, EvalError> {
        let value = self.value(position)?;
        value
            .as_object()
            .ok_or_else(|| self.invalid(position, "an object", type_name(value)))
    }

    fn numbers(&self, position: usize) -> Result<Vec<f64>, EvalError> {
        self.array(position)?
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| self.invalid(position, "an array of numbers", type_name(item)))
            })
            .collect()
    }

    fn regex(&self, position: usize) -> Result<Regex, EvalError> {
        let pattern = self.string(position)?;
        Regex::new(pattern).map_err(|e| self.failed(format!("invalid pattern: {e}")))
    }
}

/// Call a function by name.
///
/// # Errors
/// [`EvalError::UnknownFunction`], or an arity/type error for bad arguments.
pub fn call(name: &str, args: Vec<Arg<'_>>) -> Result<Value, EvalError> {
    let a = Args { name, args };
    match name {
        // -- numbers -----------------------------------------------------
        "abs" => {
            a.arity(1, 1, "1")?;
            Ok(number(a.number(0)?.abs()))
        }
        "ceil" => {
            a.arity(1, 1, "1")?;
            Ok(number(a.number(0)?.ceil()))
        }
        "floor" => {
            a.arity(1, 1, "1")?;
            Ok(number(a.number(0)?.floor()))
        }
        "sum" => {
            a.arity(1, 1, "1")?;
            Ok(number(a.numbers(0)?.iter().sum()))
        }
        "avg" => {
            a.arity(1, 1, "1")?;
            let numbers = a.numbers(0)?;
            if numbers.is_empty() {
                return Ok(Value::Null);
            }
            Ok(number(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }
        "max" | "min" => {
            a.arity(1, 1, "1")?;
            let items = a.array(0)?;
            extreme(&a, items.iter().map(|v| Ok((v.clone(), v.clone()))), name == "max")
        }
        "max_by" | "min_by" => {
            a.arity(2, 2, "2")?;
            let expr = a.expref(1)?;
            let keyed = a
                .array(0)?
                .iter()
                .map(|item| Ok((interpret(item, expr)?, item.clone())));
            extreme(&a, keyed, name == "max_by")
        }

        // -- strings and collections -------------------------------------
        "contains" => {
            a.arity(2, 2, "2")?;
            let needle = a.value(1)?;
            match a.value(0)? {
                Value::Array(items) => Ok(Value::Bool(items.iter().any(|i| json_eq(i, needle)))),
                Value::String(s) => Ok(Value::Bool(
                    needle.as_str().is_some_and(|n| s.contains(n)),
                )),
                other => Err(a.invalid(0, "an array or a string", type_name(other))),
            }
        }
        "starts_with" => {
            a.arity(2, 2, "2")?;
            Ok(Value::Bool(a.string(0)?.starts_with(a.string(1)?)))
        }
        "ends_with" => {
            a.arity(2, 2, "2")?;
            Ok(Value::Bool(a.string(0)?.ends_with(a.string(1)?)))
        }
        "join" => {
            a.arity(2, 2, "2")?;
            let glue = a.string(0)?;
            let parts = a
                .array(1)?
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| a.invalid(1, "an array of strings", type_name(item)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(parts.join(glue)))
        }
        "length" => {
            a.arity(1, 1, "1")?;
            match a.value(0)? {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(a.invalid(0, "a string, an array or an object", type_name(other))),
            }
        }
        "reverse" => {
            a.arity(1, 1, "1")?;
            match a.value(0)? {
                Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
                Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
                other => Err(a.invalid(0, "a string or an array", type_name(other))),
            }
        }
        "keys" => {
            a.arity(1, 1, "1")?;
            Ok(Value::Array(
                a.object(0)?.keys().cloned().map(Value::String).collect(),
            ))
        }
        "values" => {
            a.arity(1, 1, "1")?;
            Ok(Value::Array(a.object(0)?.values().cloned().collect()))
        }
        "merge" => {
            let mut out = Map::new();
            for position in 0..a.args.len() {
                for (k, v) in a.object(position)? {
                    out.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Object(out))
        }
        "not_null" => {
            for position in 0..a.args.len() {
                let value = a.value(position)?;
                if !value.is_null() {
                    return Ok(value.clone());
                }
            }
            Ok(Value::Null)
        }
        "map" => {
            a.arity(2, 2, "2")?;
            let expr = a.expref(0)?;
            a.array(1)?
                .iter()
                .map(|item| interpret(item, expr))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "sort" => {
            a.arity(1, 1, "1")?;
            let mut items = a.array(0)?.clone();
            sort_values(&a, &mut items, |v| Ok(v.clone()))?;
            Ok(Value::Array(items))
        }
        "sort_by" => {
            a.arity(2, 2, "2")?;
            let expr = a.expref(1)?;
            let mut items = a.array(0)?.clone();
            sort_values(&a, &mut items, |v| interpret(v, expr))?;
            Ok(Value::Array(items))
        }

        // -- conversions -------------------------------------------------
        "to_array" => {
            a.arity(1, 1, "1")?;
            Ok(match a.value(0)? {
                Value::Array(items) => Value::Array(items.clone()),
                other => Value::Array(vec![other.clone()]),
            })
        }
        "to_string" => {
            a.arity(1, 1, "1")?;
            Ok(match a.value(0)? {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            })
        }
        "to_number" => {
            a.arity(1, 1, "1")?;
            Ok(match a.value(0)? {
                Value::Number(n) => Value::Number(n.clone()),
                Value::String(s) => s.trim().parse::<f64>().map_or(Value::Null, number),
                _ => Value::Null,
            })
        }
        "type" => {
            a.arity(1, 1, "1")?;
            Ok(Value::String(type_name(a.value(0)?).to_owned()))
        }

        // -- extensions --------------------------------------------------
        "if" => {
            a.arity(2, 3, "2 or 3")?;
            let branch = if is_truthy(a.value(0)?) { 1 } else { 2 };
            Ok(a.value(branch)?.clone())
        }
        "range" => {
            a.arity(1, 3, "1 to 3")?;
            let (start, end) = if a.args.len() == 1 {
                (0, a.integer(0)?)
            } else {
                (a.integer(0)?, a.integer(1)?)
            };
            let step = if a.args.len() == 3 { a.integer(2)? } else { 1 };
            if step == 0 {
                return Err(a.failed("step cannot be 0"));
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i < end) || (step < 0 && i > end) {
                if out.len() == RANGE_LIMIT {
                    return Err(a.failed(format!("produces more than {RANGE_LIMIT} items")));
                }
                out.push(Value::from(i));
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
            Ok(Value::Array(out))
        }
        "to_object" => {
            a.arity(1, 1, "1")?;
            let mut out = Map::new();
            for pair in a.array(0)? {
                match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(key), value]) => {
                        out.insert(key.clone(), value.clone());
                    }
                    _ => return Err(a.invalid(0, "an array of [key, value] pairs", type_name(pair))),
                }
            }
            Ok(Value::Object(out))
        }
        "json_serialize" => {
            a.arity(1, 1, "1")?;
            Ok(Value::String(a.value(0)?.to_string()))
        }
        "json_parse" => {
            a.arity(1, 1, "1")?;
            serde_json::from_str(a.string(0)?).map_err(|e| a.failed(e.to_string()))
        }
        "sha256" => {
            a.arity(1, 1, "1")?;
            Ok(Value::String(format!("{:x}", Sha256::digest(hash_input(a.value(0)?)))))
        }
        "sha512" => {
            a.arity(1, 1, "1")?;
            Ok(Value::String(format!("{:x}", Sha512::digest(hash_input(a.value(0)?)))))
        }
        "uuid" => {
            a.arity(1, 2, "1 or 2")?;
            let namespace = if a.args.len() == 2 {
                Uuid::parse_str(a.string(1)?).map_err(|e| a.failed(format!("invalid namespace: {e}")))?
            } else {
                Uuid::NAMESPACE_URL
            };
            let name = hash_input(a.value(0)?);
            Ok(Value::String(Uuid::new_v5(&namespace, &name).to_string()))
        }
        "regex_test" => {
            a.arity(2, 2, "2")?;
            Ok(Value::Bool(a.regex(1)?.is_match(a.string(0)?)))
        }
        "regex_match" => {
            a.arity(2, 2, "2")?;
            let re = a.regex(1)?;
            Ok(re
                .captures(a.string(0)?)
                .map_or(Value::Null, |caps| captures_to_json(&caps)))
        }
        "regex_match_all" => {
            a.arity(2, 2, "2")?;
            let re = a.regex(1)?;
            Ok(Value::Array(
                re.captures_iter(a.string(0)?)
                    .map(|caps| captures_to_json(&caps))
                    .collect(),
            ))
        }
        "regex_replace" => {
            a.arity(3, 3, "3")?;
            let re = a.regex(1)?;
            Ok(Value::String(
                re.replace_all(a.string(0)?, a.string(2)?).into_owned(),
            ))
        }

        _ => Err(EvalError::UnknownFunction(name.to_owned())),
    }
}

/// Bytes hashed by `sha256`, `sha512` and `uuid`: strings as-is, anything
/// else as compact JSON.
fn hash_input(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

fn captures_to_json(caps: &regex::Captures<'_>) -> Value {
    Value::Array(
        caps.iter()
            .map(|m| m.map_or(Value::Null, |m| Value::String(m.as_str().to_owned())))
            .collect(),
    )
}

/// Largest (or smallest) item by key. Keys must be all numbers or all strings.
fn extreme(
    a: &Args<'_>,
    keyed: impl Iterator<Item = Result<(Value, Value), EvalError>>,
    largest: bool,
) -> Result<Value, EvalError> {
    let mut best: Option<(Value, Value)> = None;
    for entry in keyed {
        let (key, item) = entry?;
        if !matches!(key, Value::Number(_) | Value::String(_)) {
            return Err(a.invalid(0, "an array of numbers or strings", type_name(&key)));
        }
        best = match best {
            None => Some((key, item)),
            Some((best_key, best_item)) => {
                let ordering = json_cmp(&key, &best_key).ok_or_else(|| {
                    a.invalid(0, "an array of numbers or strings", type_name(&key))
                })?;
                let better = if largest {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                };
                if better {
                    Some((key, item))
                } else {
                    Some((best_key, best_item))
                }
            }
        };
    }
    Ok(best.map_or(Value::Null, |(_, item)| item))
}

/// Stable sort by key. Keys must be all numbers or all strings.
fn sort_values(
    a: &Args<'_>,
    items: &mut Vec<Value>,
    key: impl Fn(&Value) -> Result<Value, EvalError>,
) -> Result<(), EvalError> {
    let mut keyed = items
        .drain(..)
        .map(|item| Ok((key(&item)?, item)))
        .collect::<Result<Vec<_>, EvalError>>()?;

    if let Some((first, _)) = keyed.first() {
        let kind = type_name(first);
        if !matches!(first, Value::Number(_) | Value::String(_)) {
            return Err(a.invalid(0, "an array of numbers or strings", kind));
        }
        if let Some((other, _)) = keyed.iter().find(|(k, _)| type_name(k) != kind) {
            return Err(a.invalid(0, "an array of numbers or strings", type_name(other)));
        }
    }

    keyed.sort_by(|(x, _), (y, _)| json_cmp(x, y).unwrap_or(Ordering::Equal));
    items.extend(keyed.into_iter().map(|(_, item)| item));
    Ok(())
}
