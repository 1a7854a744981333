//! Evaluation contexts and state instantiation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use evaluator::{apply_fn, is_truthy};
use scenario::models::short_action_key;
use scenario::NormalizedScenario;

use crate::models::{AvailableAction, Process, State, StateNotify};
use crate::EngineError;

/// The object every Fn marker is evaluated against:
/// `{scenario, title, tags, actors, vars, result, current, events}`.
pub(crate) fn eval_context(process: &Process, current: Value) -> Result<Value, EngineError> {
    Ok(json!({
        "scenario": serde_json::to_value(&process.scenario)?,
        "title": process.title,
        "tags": process.tags,
        "actors": process.actors,
        "vars": process.vars,
        "result": process.result,
        "current": current,
        "events": serde_json::to_value(&process.events)?,
    }))
}

/// Render a resolved value as display text.
pub(crate) fn text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub(crate) fn truthy(condition: &Value, ctx: &Value) -> Result<bool, EngineError> {
    Ok(is_truthy(&apply_fn(condition, ctx)?))
}

/// Build the [`State`] for `key`, resolving every Fn field against `ctx`.
///
/// Available actions are those referenced by an action transition whose
/// own guard and whose action's guard both hold. An action referenced by
/// several transitions is listed once.
///
/// # Errors
/// `MissingState`/`MissingAction` for dangling references, `Evaluation`
/// when a marker fails to evaluate.
pub fn instantiate_state(
    scenario: &NormalizedScenario,
    key: &str,
    ctx: &Value,
    timestamp: DateTime<Utc>,
) -> Result<State, EngineError> {
    let state = scenario
        .states
        .get(key)
        .ok_or_else(|| EngineError::MissingState(key.to_owned()))?;

    let instructions = state
        .instructions
        .iter()
        .map(|(actor, value)| Ok((actor.clone(), text(apply_fn(value, ctx)?))))
        .collect::<Result<BTreeMap<_, _>, EngineError>>()?;

    let mut actions: Vec<AvailableAction> = Vec::new();
    for transition in state.transitions.iter().filter_map(|t| t.as_action()) {
        let short = short_action_key(key, &transition.on);
        if actions.iter().any(|a| a.key == short) {
            continue;
        }
        let action = scenario
            .actions
            .get(&transition.on)
            .ok_or_else(|| EngineError::MissingAction(transition.on.clone()))?;
        if !truthy(&transition.condition, ctx)? || !truthy(&action.condition, ctx)? {
            continue;
        }
        actions.push(AvailableAction {
            key: short.to_owned(),
            title: action.title.clone(),
            description: action.description.clone(),
            actor: action.actor.clone(),
            response: action.response.clone(),
        });
    }

    let mut notify = Vec::new();
    for entry in &state.notify {
        if !truthy(&entry.condition, ctx)? {
            continue;
        }
        let message = entry
            .message
            .as_ref()
            .map(|m| apply_fn(m, ctx))
            .transpose()?;
        notify.push(StateNotify {
            service: entry.service.clone(),
            trigger: entry.trigger.clone(),
            message,
        });
    }

    Ok(State {
        key: key.to_owned(),
        timestamp,
        title: text(apply_fn(&state.title, ctx)?),
        description: text(apply_fn(&state.description, ctx)?),
        instructions,
        notify,
        actions,
        actor: None,
        response: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(states: Value) -> NormalizedScenario {
        scenario::normalize(&json!({ "actors": { "client": null }, "states": states })).unwrap()
    }

    #[test]
    fn fn_fields_resolve_against_the_context() {
        let scenario = scenario(json!({
            "initial": {
                "title": { "<tpl>": "Hello {{vars.name}}" },
                "instructions": { "client": { "<ref>": "vars.name" } },
                "on": "complete",
                "goto": "(done)"
            }
        }));
        let ctx = json!({ "vars": { "name": "Alice" } });
        let state = instantiate_state(&scenario, "initial", &ctx, Utc::now()).unwrap();
        assert_eq!(state.title, "Hello Alice");
        assert_eq!(state.instructions["client"], "Alice");
        assert_eq!(state.actions.len(), 1);
        assert_eq!(state.actions[0].key, "complete");
    }

    #[test]
    fn guarded_transitions_hide_actions() {
        let scenario = scenario(json!({
            "initial": {
                "transitions": [
                    { "on": "approve", "if": { "<ref>": "vars.ok" }, "goto": "(done)" },
                    { "on": "reject", "goto": "(cancelled)" }
                ]
            }
        }));
        let state = instantiate_state(&scenario, "initial", &json!({ "vars": { "ok": false } }), Utc::now()).unwrap();
        let keys: Vec<_> = state.actions.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["reject"]);
    }

    #[test]
    fn unknown_state_is_an_error() {
        let scenario = scenario(json!({ "initial": { "on": "complete", "goto": "(done)" } }));
        let err = instantiate_state(&scenario, "nowhere", &Value::Null, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::MissingState(key) if key == "nowhere"));
    }
}
