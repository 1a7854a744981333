//! `evaluator` crate — resolution of Fn markers against a runtime context.
//!
//! A Fn marker is a single-key JSON object whose key is one of:
//!
//! | key        | payload                                                        |
//! |------------|----------------------------------------------------------------|
//! | `<ref>`    | a query string, see [`query`]                                  |
//! | `<tpl>`    | a template string, or `{template, view?, partials?}`           |
//! | `<select>` | `{"$": discriminant, "<case>": value, …, "*": default}`        |
//!
//! [`apply_fn`] walks any JSON value and replaces every marker it finds with
//! its resolved value.

pub mod error;
pub mod query;
pub mod template;

use serde_json::{Map, Value};

pub use error::EvalError;
pub use query::search;

pub const REF_KEY: &str = "<ref>";
pub const TPL_KEY: &str = "<tpl>";
pub const SELECT_KEY: &str = "<select>";

const SELECT_DISCRIMINANT: &str = "$";
const SELECT_DEFAULT: &str = "*";

/// A recognized Fn marker, borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FnValue<'a> {
    Ref(&'a Value),
    Tpl(&'a Value),
    Select(&'a Value),
}

impl<'a> FnValue<'a> {
    /// Recognize a marker by shape: an object with exactly one marker key.
    pub fn detect(value: &'a Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let (key, payload) = map.iter().next()?;
        match key.as_str() {
            REF_KEY => Some(Self::Ref(payload)),
            TPL_KEY => Some(Self::Tpl(payload)),
            SELECT_KEY => Some(Self::Select(payload)),
            _ => None,
        }
    }

    /// Resolve the marker against `ctx`.
    ///
    /// # Errors
    /// [`EvalError::Marker`] if the payload has the wrong shape, or any error
    /// from the query language or the template engine.
    pub fn eval(&self, ctx: &Value) -> Result<Value, EvalError> {
        match self {
            Self::Ref(payload) => {
                let query = payload.as_str().ok_or_else(|| EvalError::Marker {
                    kind: REF_KEY,
                    message: "expected a query string".into(),
                })?;
                search(query, ctx)
            }
            Self::Tpl(payload) => eval_template(payload, ctx),
            Self::Select(payload) => eval_select(payload, ctx),
        }
    }
}

/// Whether a value is a Fn marker.
pub fn is_fn(value: &Value) -> bool {
    FnValue::detect(value).is_some()
}

/// Resolve every Fn marker inside `node`.
///
/// Arrays and plain objects are walked recursively; a marker is replaced
/// wholesale by its value. Scalars are returned unchanged.
///
/// # Errors
/// The first marker that fails to evaluate.
pub fn apply_fn(node: &Value, ctx: &Value) -> Result<Value, EvalError> {
    if let Some(marker) = FnValue::detect(node) {
        return marker.eval(ctx);
    }
    match node {
        Value::Array(items) => items
            .iter()
            .map(|item| apply_fn(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), apply_fn(value, ctx)?);
            }
            Ok(Value::Object(out))
        }
        scalar => Ok(scalar.clone()),
    }
}

/// Truthiness used by guards and query operators: `false`, `null` and empty
/// strings, arrays and objects are false; everything else (including `0`)
/// is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn eval_template(payload: &Value, ctx: &Value) -> Result<Value, EvalError> {
    let malformed = |message: &str| EvalError::Marker {
        kind: TPL_KEY,
        message: message.to_owned(),
    };
    match payload {
        Value::String(template) => template::render(template, ctx, &Map::new()).map(Value::String),
        Value::Object(options) => {
            let template = options
                .get("template")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("missing 'template' string"))?;
            let view = match options.get("view") {
                Some(view) => apply_fn(view, ctx)?,
                None => ctx.clone(),
            };
            let partials = match options.get("partials") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(partials)) => partials.clone(),
                Some(_) => return Err(malformed("'partials' must be an object")),
            };
            template::render(template, &view, &partials).map(Value::String)
        }
        _ => Err(malformed("expected a template string or object")),
    }
}

fn eval_select(payload: &Value, ctx: &Value) -> Result<Value, EvalError> {
    let cases = payload.as_object().ok_or_else(|| EvalError::Marker {
        kind: SELECT_KEY,
        message: "expected an object of cases".into(),
    })?;
    let discriminant = cases
        .get(SELECT_DISCRIMINANT)
        .map(|d| apply_fn(d, ctx))
        .transpose()?
        .unwrap_or(Value::Null);

    let key = match &discriminant {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    };

    let chosen = key
        .filter(|k| k != SELECT_DISCRIMINANT)
        .and_then(|k| cases.get(&k))
        .or_else(|| cases.get(SELECT_DEFAULT));

    match chosen {
        Some(value) => apply_fn(value, ctx),
        None => Ok(Value::Null),
    }
}
