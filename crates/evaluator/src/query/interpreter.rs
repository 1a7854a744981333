//! Tree-walking interpreter for parsed queries.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::ast::{Ast, Comparator};
use super::functions::{self, Arg};
use crate::{is_truthy, EvalError};

/// Evaluate `node` against `data`.
///
/// # Errors
/// Only function calls can fail at runtime; every other node evaluates to
/// `null` when the data does not have the expected shape.
pub fn interpret(data: &Value, node: &Ast) -> Result<Value, EvalError> {
    match node {
        Ast::Identity => Ok(data.clone()),
        Ast::Literal(value) => Ok(value.clone()),
        Ast::Field(name) => Ok(data.get(name).cloned().unwrap_or(Value::Null)),
        Ast::Subexpr(lhs, rhs) => {
            let left = interpret(data, lhs)?;
            interpret(&left, rhs)
        }
        Ast::Index(index) => Ok(match data {
            Value::Array(items) => resolve_index(items.len(), *index)
                .map(|i| items[i].clone())
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }),
        Ast::Slice { start, stop, step } => Ok(match data {
            Value::Array(items) => Value::Array(slice(items, *start, *stop, *step)),
            _ => Value::Null,
        }),
        Ast::Projection { lhs, rhs } => {
            let Value::Array(items) = interpret(data, lhs)? else {
                return Ok(Value::Null);
            };
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                let projected = interpret(item, rhs)?;
                if !projected.is_null() {
                    out.push(projected);
                }
            }
            Ok(Value::Array(out))
        }
        Ast::ObjectValues(inner) => Ok(match interpret(data, inner)? {
            Value::Object(map) => Value::Array(map.into_iter().map(|(_, v)| v).collect()),
            _ => Value::Null,
        }),
        Ast::Flatten(inner) => Ok(match interpret(data, inner)? {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(nested) => out.extend(nested),
                        other => out.push(other),
                    }
                }
                Value::Array(out)
            }
            _ => Value::Null,
        }),
        Ast::Condition { predicate, then } => {
            if is_truthy(&interpret(data, predicate)?) {
                interpret(data, then)
            } else {
                Ok(Value::Null)
            }
        }
        Ast::Comparison {
            comparator,
            lhs,
            rhs,
        } => {
            let left = interpret(data, lhs)?;
            let right = interpret(data, rhs)?;
            Ok(compare(*comparator, &left, &right))
        }
        Ast::And(lhs, rhs) => {
            let left = interpret(data, lhs)?;
            if is_truthy(&left) {
                interpret(data, rhs)
            } else {
                Ok(left)
            }
        }
        Ast::Or(lhs, rhs) => {
            let left = interpret(data, lhs)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                interpret(data, rhs)
            }
        }
        Ast::Not(inner) => Ok(Value::Bool(!is_truthy(&interpret(data, inner)?))),
        Ast::MultiList(items) => {
            if data.is_null() {
                return Ok(Value::Null);
            }
            items
                .iter()
                .map(|item| interpret(data, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Ast::MultiHash(pairs) => {
            if data.is_null() {
                return Ok(Value::Null);
            }
            let mut out = Map::new();
            for (key, item) in pairs {
                out.insert(key.clone(), interpret(data, item)?);
            }
            Ok(Value::Object(out))
        }
        Ast::Function { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(match arg {
                    Ast::Expref(inner) => Arg::Expref(inner),
                    other => Arg::Value(interpret(data, other)?),
                });
            }
            functions::call(name, evaluated)
        }
        Ast::Expref(_) => Err(EvalError::UnexpectedExpref),
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then(|| resolved as usize)
}

fn slice(items: &[Value], start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Vec<Value> {
    let len = items.len() as i64;
    let step = step.unwrap_or(1);
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let stop = stop.map_or(len, |s| clamp(s, 0, len));
        while i < stop {
            out.push(items[i as usize].clone());
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > stop {
            out.push(items[i as usize].clone());
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    out
}

/// JSON equality with numbers compared by value, so `1` equals `1.0`.
pub(crate) fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => left == right,
    }
}

/// Ordering of two numbers or two strings; anything else is unordered.
pub(crate) fn json_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare(comparator: Comparator, left: &Value, right: &Value) -> Value {
    match comparator {
        Comparator::Eq => Value::Bool(json_eq(left, right)),
        Comparator::Ne => Value::Bool(!json_eq(left, right)),
        ordered => match json_cmp(left, right) {
            None => Value::Null,
            Some(ordering) => Value::Bool(match ordered {
                Comparator::Lt => ordering.is_lt(),
                Comparator::Lte => ordering.is_le(),
                Comparator::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::search;

    #[test]
    fn field_access_and_missing_paths() {
        let data = json!({ "a": { "b": { "c": 1 } } });
        assert_eq!(search("a.b.c", &data).unwrap(), json!(1));
        assert_eq!(search("a.x.c", &data).unwrap(), json!(null));
        assert_eq!(search("\"a\".b", &data).unwrap(), json!({ "c": 1 }));
    }

    #[test]
    fn indexes_and_slices() {
        let data = json!({ "xs": [0, 1, 2, 3, 4, 5] });
        assert_eq!(search("xs[1]", &data).unwrap(), json!(1));
        assert_eq!(search("xs[-1]", &data).unwrap(), json!(5));
        assert_eq!(search("xs[10]", &data).unwrap(), json!(null));
        assert_eq!(search("xs[1:3]", &data).unwrap(), json!([1, 2]));
        assert_eq!(search("xs[::2]", &data).unwrap(), json!([0, 2, 4]));
        assert_eq!(search("xs[::-1]", &data).unwrap(), json!([5, 4, 3, 2, 1, 0]));
        assert_eq!(search("xs[-2:]", &data).unwrap(), json!([4, 5]));
    }

    #[test]
    fn huge_slice_steps_stop_at_the_end() {
        let data = json!({ "xs": [0, 1, 2, 3] });
        assert_eq!(search("xs[1::9223372036854775807]", &data).unwrap(), json!([1]));
        assert_eq!(search("xs[::-9223372036854775808]", &data).unwrap(), json!([3]));
    }

    #[test]
    fn projections() {
        let data = json!({
            "people": [
                { "name": "a", "age": 30, "tags": ["x", "y"] },
                { "name": "b", "age": 20, "tags": ["z"] },
                { "name": "c" }
            ],
            "ops": { "x": { "n": 1 }, "y": { "n": 2 } }
        });
        assert_eq!(search("people[*].age", &data).unwrap(), json!([30, 20]));
        assert_eq!(search("people[].tags[]", &data).unwrap(), json!(["x", "y", "z"]));
        assert_eq!(search("ops.*.n", &data).unwrap(), json!([1, 2]));
        assert_eq!(
            search("people[?age > `25`].name", &data).unwrap(),
            json!(["a"])
        );
        assert_eq!(search("people[*].name | [0]", &data).unwrap(), json!("a"));
    }

    #[test]
    fn boolean_logic_and_comparisons() {
        let data = json!({ "a": 1, "b": 1.0, "empty": [], "s": "x" });
        assert_eq!(search("a == b", &data).unwrap(), json!(true));
        assert_eq!(search("a != `2`", &data).unwrap(), json!(true));
        assert_eq!(search("empty || s", &data).unwrap(), json!("x"));
        assert_eq!(search("s && a", &data).unwrap(), json!(1));
        assert_eq!(search("!empty", &data).unwrap(), json!(true));
        assert_eq!(search("s < `1`", &data).unwrap(), json!(null));
        assert_eq!(search("'a' < 'b'", &data).unwrap(), json!(true));
    }

    #[test]
    fn multiselect() {
        let data = json!({ "a": 1, "b": { "c": 2 } });
        assert_eq!(
            search("{first: a, second: b.c}", &data).unwrap(),
            json!({ "first": 1, "second": 2 })
        );
        assert_eq!(search("[a, b.c]", &data).unwrap(), json!([1, 2]));
        assert_eq!(search("missing.[a]", &data).unwrap(), json!(null));
    }
}
