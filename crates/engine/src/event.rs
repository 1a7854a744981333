//! Process events and the hash chain.
//!
//! Every event carries `hash`, the SHA-256 of the canonical JSON of all its
//! other fields. Every event after the first carries `previous`, the hash of
//! the event before it. The first event of a log is always an
//! [`InstantiateEvent`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use scenario::canonical_json;
use scenario::hash::sha256_hex;

use crate::models::ActorRef;
use crate::EngineError;

/// Genesis event of a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Deterministic id of the scenario the process was started from.
    pub scenario: Uuid,
    #[serde(default)]
    pub actors: BTreeMap<String, Value>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(default)]
    pub hash: String,
}

/// An attempted action, successful or skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub previous: String,
    pub timestamp: DateTime<Utc>,
    /// Short action key as passed to `step`.
    pub action: String,
    pub actor: ActorRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub hash: String,
}

/// A timeout transition that was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutEvent {
    pub previous: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
}

/// Any entry of a process event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Instantiate(InstantiateEvent),
    Action(ActionEvent),
    Timeout(TimeoutEvent),
}

impl Event {
    pub fn hash(&self) -> &str {
        match self {
            Self::Instantiate(e) => &e.hash,
            Self::Action(e) => &e.hash,
            Self::Timeout(e) => &e.hash,
        }
    }

    /// `None` for the genesis event.
    pub fn previous(&self) -> Option<&str> {
        match self {
            Self::Instantiate(_) => None,
            Self::Action(e) => Some(&e.previous),
            Self::Timeout(e) => Some(&e.previous),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Instantiate(e) => e.timestamp,
            Self::Action(e) => e.timestamp,
            Self::Timeout(e) => e.timestamp,
        }
    }

    /// Point this event at a new predecessor. No-op for the genesis event.
    pub fn set_previous(&mut self, previous: &str) {
        match self {
            Self::Instantiate(_) => {}
            Self::Action(e) => e.previous = previous.to_owned(),
            Self::Timeout(e) => e.previous = previous.to_owned(),
        }
    }

    /// Digest of the event without its `hash` field.
    ///
    /// # Errors
    /// Fails only if the event cannot be serialized.
    pub fn compute_hash(&self) -> Result<String, EngineError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("hash");
        }
        Ok(sha256_hex(canonical_json(&value).as_bytes()))
    }

    /// Recompute and store `hash`.
    pub fn seal(mut self) -> Result<Self, EngineError> {
        let hash = self.compute_hash()?;
        match &mut self {
            Self::Instantiate(e) => e.hash = hash,
            Self::Action(e) => e.hash = hash,
            Self::Timeout(e) => e.hash = hash,
        }
        Ok(self)
    }
}

impl From<InstantiateEvent> for Event {
    fn from(event: InstantiateEvent) -> Self {
        Self::Instantiate(event)
    }
}

impl From<ActionEvent> for Event {
    fn from(event: ActionEvent) -> Self {
        Self::Action(event)
    }
}

impl From<TimeoutEvent> for Event {
    fn from(event: TimeoutEvent) -> Self {
        Self::Timeout(event)
    }
}
