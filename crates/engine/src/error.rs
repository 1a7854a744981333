//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Hard failures of the process runtime.
///
/// Business rejections (unknown action, unauthorized actor, invalid response,
/// no matching transition) are not errors: they are recorded as skipped
/// events. Everything here points at a scenario, log or caller defect.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Scenario defects ------

    /// The scenario could not be normalized or hashed.
    #[error(transparent)]
    Scenario(#[from] scenario::ScenarioError),

    /// A Fn marker in the scenario failed to evaluate.
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] evaluator::EvalError),

    /// A transition targets a state the scenario does not define.
    #[error("state '{0}' is not defined in the scenario")]
    MissingState(String),

    /// A transition references an action the scenario does not define.
    #[error("action '{0}' is not defined in the scenario")]
    MissingAction(String),

    /// An update instruction targets a path outside the allowed roots.
    #[error("update target '{0}' is not allowed")]
    InvalidUpdateTarget(String),

    // ------ Caller defects ------

    /// Start instructions do not conform to the actor or variable schemas.
    #[error("invalid start instructions: {}", .0.join("; "))]
    InvalidStart(Vec<String>),

    // ------ Event log defects ------

    /// The log is empty or does not begin with an instantiate event.
    #[error("the event log must begin with an instantiate event")]
    MissingGenesis,

    /// An instantiate event appears after the start of the log.
    #[error("event {index} is an instantiate event but the process already exists")]
    GenesisOnExisting { index: usize },

    /// An event's `previous` does not match the hash of the event before it.
    #[error("event {index} does not link to the previous event")]
    BrokenChain { index: usize },

    /// An event's stored hash does not match its content.
    #[error("event {index} hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        index: usize,
        stored: String,
        computed: String,
    },

    /// The log was written for a different scenario.
    #[error("events belong to scenario {found}, expected {expected}")]
    ScenarioMismatch { expected: Uuid, found: Uuid },

    /// A stored event claims an outcome that re-validation does not reproduce.
    #[error("event {index} does not replay: {}", .reasons.join("; "))]
    LogIntegrity { index: usize, reasons: Vec<String> },

    // ------ Prediction ------

    /// Prediction produced `max` states without terminating.
    #[error("prediction did not terminate within {0} states")]
    IterationLimit(usize),

    /// Serialization of a process or event failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
