//! Core domain models for the process runtime.
//!
//! A [`Process`] is a running instance of a scenario. It is never mutated by
//! the engine: every operation takes a process by reference and returns a new
//! one. Everything a process is can be rebuilt from its scenario and its
//! [`Event`] log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use scenario::NormalizedScenario;

use crate::event::Event;

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Who performs a step: a process actor key, optionally with the id of the
/// party acting as that actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ActorRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: None,
        }
    }

    pub fn with_id(key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: Some(id.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Start instructions
// ---------------------------------------------------------------------------

/// Caller input for [`crate::ProcessEngine::instantiate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartInstructions {
    /// Process id; a random v4 id when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Genesis timestamp; the current time when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Actor key → properties merged over the schema defaults.
    #[serde(default)]
    pub actors: BTreeMap<String, Value>,
    /// Variable name → initial value.
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An action that can be performed in the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableAction {
    /// Action key as used in `step` (without the `<state>.` prefix).
    pub key: String,
    pub title: String,
    pub description: String,
    /// Actors allowed to perform it.
    pub actor: Vec<String>,
    /// JSON schema of the response.
    pub response: Value,
}

/// A resolved notify entry of the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNotify {
    pub service: String,
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

/// The state a process is in, with every Fn marker resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub key: String,
    /// When the state was entered.
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub description: String,
    /// Actor key → instructions.
    pub instructions: BTreeMap<String, String>,
    pub notify: Vec<StateNotify>,
    pub actions: Vec<AvailableAction>,
    /// Actor whose step entered this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRef>,
    /// Response of the step that entered this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl State {
    pub fn action(&self, key: &str) -> Option<&AvailableAction> {
        self.actions.iter().find(|a| a.key == key)
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// An entry of the human-readable process log, written when a transition
/// with an enabled `log` policy is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRef>,
}

/// A running scenario instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub title: String,
    pub tags: Vec<String>,
    /// Deterministic id of `scenario`.
    pub scenario_id: Uuid,
    pub scenario: NormalizedScenario,
    /// Actor key → actor instance.
    pub actors: BTreeMap<String, Value>,
    /// Variable name → value.
    pub vars: BTreeMap<String, Value>,
    pub result: Value,
    pub current: State,
    pub events: Vec<Event>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl Process {
    /// Hash of the last event, the `previous` link of the next one.
    pub fn tail_hash(&self) -> Option<&str> {
        self.events.last().map(Event::hash)
    }

    /// Whether the current state is terminal.
    pub fn is_finished(&self) -> bool {
        self.scenario
            .states
            .get(&self.current.key)
            .map_or(true, |state| state.transitions.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// One state of a predicted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedState {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub instructions: BTreeMap<String, String>,
    /// Keys of the actions available in the state.
    pub actions: Vec<String>,
}

impl From<&State> for PredictedState {
    fn from(state: &State) -> Self {
        Self {
            key: state.key.clone(),
            timestamp: state.timestamp,
            title: state.title.clone(),
            description: state.description.clone(),
            instructions: state.instructions.clone(),
            actions: state.actions.iter().map(|a| a.key.clone()).collect(),
        }
    }
}
