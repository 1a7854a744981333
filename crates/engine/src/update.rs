//! Update instructions applied to the working evaluation context.

use serde_json::{Map, Value};

use evaluator::apply_fn;
use scenario::{UpdateInstruction, UpdateMode};

use crate::state::truthy;
use crate::EngineError;

/// Roots an update may write to.
const ALLOWED_ROOTS: &[&str] = &["title", "actors", "vars", "result", "current.actor"];

/// Whether `path` is one of the allowed roots or lies below one.
pub fn is_allowed_target(path: &str) -> bool {
    ALLOWED_ROOTS.iter().any(|root| {
        path == *root
            || path
                .strip_prefix(root)
                .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
    })
}

/// Apply `updates` in order to `ctx`. Each instruction sees the effect of the
/// ones before it.
///
/// While predicting, an instruction's `stub` is used instead of its `value`.
///
/// # Errors
/// `InvalidUpdateTarget` for a path outside [`ALLOWED_ROOTS`], `Evaluation`
/// when a value or guard fails to evaluate.
pub fn apply_updates(
    ctx: &mut Value,
    updates: &[UpdateInstruction],
    predicting: bool,
) -> Result<(), EngineError> {
    for update in updates {
        if !is_allowed_target(&update.set) {
            return Err(EngineError::InvalidUpdateTarget(update.set.clone()));
        }
        if !truthy(&update.condition, ctx)? {
            continue;
        }
        let source = match (&update.stub, predicting) {
            (Some(stub), true) => stub,
            _ => &update.value,
        };
        let value = apply_fn(source, ctx)?;
        let slot = slot_mut(ctx, &update.set);
        let existing = std::mem::take(slot);
        *slot = combine(existing, value, update.mode);
    }
    Ok(())
}

/// Mutable reference to the value at a dotted path, creating objects on the
/// way. Non-object intermediates are replaced.
fn slot_mut<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    path.split('.').fold(root, |node, segment| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        &mut node[segment]
    })
}

fn combine(existing: Value, value: Value, mode: UpdateMode) -> Value {
    match mode {
        UpdateMode::Replace => value,
        UpdateMode::Merge => match (existing, value) {
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Value::Array(a)
            }
            (Value::Object(mut a), Value::Object(b)) => {
                a.extend(b);
                Value::Object(a)
            }
            (_, value) => value,
        },
        UpdateMode::Append => match existing {
            Value::Array(mut items) => {
                items.push(value);
                Value::Array(items)
            }
            Value::Null => Value::Array(vec![value]),
            other => Value::Array(vec![other, value]),
        },
    }
}
