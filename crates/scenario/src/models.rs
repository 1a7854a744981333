//! Canonical scenario model.
//!
//! These types are the output of [`crate::normalize`]. Every optional field
//! of the authored document has been defaulted, shorthand has been expanded,
//! and implicit actions, end states and notify entries have been synthesized.
//! Fields that may hold a Fn marker (`<ref>`, `<tpl>`, `<select>`) are kept as
//! raw [`Value`]s and resolved by the engine at runtime.
//!
//! All maps are `BTreeMap`s so serialization is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::matches_actor;

/// The `$schema` URI of the scenario format understood by this crate.
pub const SCENARIO_SCHEMA: &str = "https://schemas.procession.dev/v1.0/scenario";

// ---------------------------------------------------------------------------
// Update instructions
// ---------------------------------------------------------------------------

/// How an update combines its value with the existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Replace,
    /// Arrays concatenate, objects shallow-merge, anything else is replaced.
    Merge,
    /// Push the value onto the existing array.
    Append,
}

/// A single `update` entry of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInstruction {
    /// Dotted target path, e.g. `vars.amount` or `current.actor.name`.
    pub set: String,
    pub value: Value,
    /// Used instead of `value` while predicting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<Value>,
    pub mode: UpdateMode,
    #[serde(rename = "if")]
    pub condition: Value,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A named operation an actor may perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAction {
    pub title: String,
    pub description: String,
    /// Actor keys, `*`-templates, roles or `service:<name>` entries allowed to act.
    pub actor: Vec<String>,
    #[serde(rename = "if")]
    pub condition: Value,
    /// JSON schema of the response.
    pub response: Value,
    pub update: Vec<UpdateInstruction>,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// What the process log shows when a transition is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLog {
    pub title: Value,
    pub description: Value,
    #[serde(rename = "if")]
    pub condition: Value,
}

/// A transition triggered by performing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTransition {
    /// Full action key.
    pub on: String,
    /// Optional actor filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<Vec<String>>,
    pub goto: Option<String>,
    #[serde(rename = "if")]
    pub condition: Value,
    pub log: TransitionLog,
}

/// A transition triggered once the state has been current for `after` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutTransition {
    pub after: u64,
    pub goto: Option<String>,
    #[serde(rename = "if")]
    pub condition: Value,
    pub log: TransitionLog,
}

/// An edge out of a state. Declaration order is the tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transition {
    Action(ActionTransition),
    Timeout(TimeoutTransition),
}

impl Transition {
    pub fn goto(&self) -> Option<&str> {
        match self {
            Self::Action(t) => t.goto.as_deref(),
            Self::Timeout(t) => t.goto.as_deref(),
        }
    }

    pub fn condition(&self) -> &Value {
        match self {
            Self::Action(t) => &t.condition,
            Self::Timeout(t) => &t.condition,
        }
    }

    pub fn log(&self) -> &TransitionLog {
        match self {
            Self::Action(t) => &t.log,
            Self::Timeout(t) => &t.log,
        }
    }

    pub fn as_action(&self) -> Option<&ActionTransition> {
        match self {
            Self::Action(t) => Some(t),
            Self::Timeout(_) => None,
        }
    }

    pub fn as_timeout(&self) -> Option<&TimeoutTransition> {
        match self {
            Self::Action(_) => None,
            Self::Timeout(t) => Some(t),
        }
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// A service that should be told about a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    /// Service name, without the `service:` prefix.
    pub service: String,
    /// Action the service is expected to perform, if unambiguous.
    pub trigger: Option<String>,
    #[serde(rename = "if")]
    pub condition: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

/// A state of the scenario. End states (keys like `(done)`) have no
/// transitions and no notify entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedState {
    pub title: Value,
    pub description: Value,
    /// Actor key → instructions for that actor.
    pub instructions: BTreeMap<String, Value>,
    pub notify: Vec<Notify>,
    pub transitions: Vec<Transition>,
}

impl NormalizedState {
    /// A terminal state with the given title.
    pub fn end(title: &str) -> Self {
        Self {
            title: Value::String(title.to_owned()),
            description: Value::String(String::new()),
            instructions: BTreeMap::new(),
            notify: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn has_action_transitions(&self) -> bool {
        self.transitions.iter().any(|t| t.as_action().is_some())
    }
}

/// `true` for end-state names like `(done)` or `(cancelled)`.
pub fn is_end_state(key: &str) -> bool {
    key.len() > 2 && key.starts_with('(') && key.ends_with(')')
}

// ---------------------------------------------------------------------------
// NormalizedScenario
// ---------------------------------------------------------------------------

/// A complete, canonical scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedScenario {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Actor name (or `*`-template name) → actor schema.
    pub actors: BTreeMap<String, Value>,
    pub actions: BTreeMap<String, NormalizedAction>,
    pub states: BTreeMap<String, NormalizedState>,
    /// Variable name → schema.
    pub vars: BTreeMap<String, Value>,
    /// Schema of the process result.
    pub result: Value,
    /// Shared schema definitions, the target of `#/$defs/…` references.
    #[serde(default, rename = "$defs", skip_serializing_if = "BTreeMap::is_empty")]
    pub defs: BTreeMap<String, Value>,
}

impl NormalizedScenario {
    /// Schema for an actor key, falling back to its `*`-template.
    pub fn actor_schema(&self, key: &str) -> Option<&Value> {
        self.actors.get(key).or_else(|| {
            self.actors
                .iter()
                .find(|(name, _)| name.ends_with('*') && matches_actor(name, key))
                .map(|(_, schema)| schema)
        })
    }

    /// Resolve an action name used in a state to its full key: a
    /// synthesized `<state>.<action>` key wins over a global one.
    pub fn resolve_action_key(&self, state: &str, action: &str) -> String {
        let scoped = format!("{state}.{action}");
        if self.actions.contains_key(&scoped) {
            scoped
        } else {
            action.to_owned()
        }
    }

    /// Combined object schema for all process variables.
    pub fn vars_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        })
    }
}

/// Strip the `<state>.` prefix of a full action key.
pub fn short_action_key<'a>(state: &str, key: &'a str) -> &'a str {
    key.strip_prefix(state)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_transition_picks_the_right_variant() {
        let action: Transition = serde_json::from_value(json!({
            "on": "complete", "goto": "(done)", "if": true,
            "log": { "title": "complete", "description": "", "if": true }
        }))
        .unwrap();
        assert!(action.as_action().is_some());

        let timeout: Transition = serde_json::from_value(json!({
            "after": 180, "goto": "(done)", "if": true,
            "log": { "title": "", "description": "", "if": false }
        }))
        .unwrap();
        assert_eq!(timeout.as_timeout().map(|t| t.after), Some(180));
    }

    #[test]
    fn end_state_names() {
        assert!(is_end_state("(done)"));
        assert!(!is_end_state("()"));
        assert!(!is_end_state("done"));
    }

    #[test]
    fn short_keys_strip_only_the_own_state() {
        assert_eq!(short_action_key("initial", "initial.complete"), "complete");
        assert_eq!(short_action_key("initial", "complete"), "complete");
        assert_eq!(short_action_key("initial", "initialize"), "initialize");
        assert_eq!(short_action_key("second", "initial.complete"), "initial.complete");
    }
}
