//! Forward simulation of a process.
//!
//! Prediction replays the engine's own `step`/`timeout` decisions against a
//! copy of the process, so a predicted path is exactly what real execution
//! would do given the same choices. Nothing is persisted.

use std::collections::HashSet;

use chrono::Duration;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use scenario::actor::{matches_actor, service_name};
use scenario::hash::content_hash;
use scenario::models::short_action_key;

use crate::executor::Outcome;
use crate::models::{ActorRef, PredictedState, Process};
use crate::{EngineError, ProcessEngine};

impl ProcessEngine {
    /// Predict the states the process will pass through, starting with the
    /// current one, using the configured `predict_max`.
    ///
    /// # Errors
    /// See [`predict_with_max`](Self::predict_with_max).
    pub fn predict(&self, process: &Process) -> Result<Vec<PredictedState>, EngineError> {
        self.predict_with_max(process, self.config.predict_max)
    }

    /// Predict at most `max` states.
    ///
    /// Stops at a terminal state, when no action or timeout can be taken, or
    /// when a state is reached whose fingerprint was already seen (that state
    /// is included).
    ///
    /// # Errors
    /// `IterationLimit` when `max` states were produced without stopping.
    #[instrument(skip(self, process), fields(process_id = %process.id))]
    pub fn predict_with_max(
        &self,
        process: &Process,
        max: usize,
    ) -> Result<Vec<PredictedState>, EngineError> {
        let mut process = process.clone();
        let mut seen = HashSet::from([fingerprint(&process)?]);
        let mut predicted = vec![PredictedState::from(&process.current)];

        if process.is_finished() {
            debug!("prediction starts in a terminal state");
            return Ok(predicted);
        }

        loop {
            if predicted.len() >= max {
                return Err(EngineError::IterationLimit(max));
            }
            let Some(next) = self.predict_next(&process)? else {
                debug!("prediction stuck in state '{}'", process.current.key);
                break;
            };
            process = next;
            predicted.push(PredictedState::from(&process.current));

            if !seen.insert(fingerprint(&process)?) {
                debug!("prediction reached a cycle at '{}'", process.current.key);
                break;
            }
            if process.is_finished() {
                debug!("prediction reached terminal state '{}'", process.current.key);
                break;
            }
        }
        Ok(predicted)
    }

    /// The first successful simulated move from the current state.
    fn predict_next(&self, process: &Process) -> Result<Option<Process>, EngineError> {
        let key = process.current.key.as_str();
        let Some(state) = process.scenario.states.get(key) else {
            return Err(EngineError::MissingState(key.to_owned()));
        };
        let timestamp = process.current.timestamp;

        let mut tried: HashSet<(String, String)> = HashSet::new();
        for transition in state.transitions.iter().filter_map(|t| t.as_action()) {
            let short = short_action_key(key, &transition.on);
            let Some(action) = process.current.action(short) else {
                continue;
            };
            for actor in candidate_actors(process, &action.actor) {
                if !tried.insert((short.to_owned(), actor.clone())) {
                    continue;
                }
                let actor = ActorRef::new(actor);
                if let Outcome::Accepted(next) =
                    self.try_step(process, short, &actor, None, timestamp, true)?
                {
                    return Ok(Some(*next));
                }
            }
        }

        for transition in state.transitions.iter().filter_map(|t| t.as_timeout()) {
            let Some(now) = i64::try_from(transition.after)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|after| timestamp.checked_add_signed(after))
            else {
                continue;
            };
            if let Some(next) = self.try_timeout(process, now)? {
                return Ok(Some(next));
            }
        }
        Ok(None)
    }
}

/// Process actors that an actor list could refer to, in list order.
/// `service:` entries stand for every actor.
fn candidate_actors(process: &Process, allowed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in allowed {
        for (key, instance) in &process.actors {
            let role_match = match instance.get("role") {
                Some(Value::String(role)) => role == entry,
                Some(Value::Array(roles)) => roles.iter().any(|r| r == entry.as_str()),
                _ => false,
            };
            let matches = matches_actor(entry, key) || role_match || service_name(entry).is_some();
            if matches && !out.contains(key) {
                out.push(key.clone());
            }
        }
    }
    out
}

/// Cycle fingerprint: process data and current state key. Event history and
/// timestamps are excluded.
fn fingerprint(process: &Process) -> Result<String, EngineError> {
    Ok(content_hash(&json!({
        "title": process.title,
        "tags": process.tags,
        "actors": process.actors,
        "vars": process.vars,
        "result": process.result,
        "current": process.current.key,
    }))?)
}
