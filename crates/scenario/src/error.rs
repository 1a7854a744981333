//! Canonicalizer error types.

use thiserror::Error;

/// Structural defects found while normalizing a scenario.
///
/// These are authoring errors: the scenario cannot be run until fixed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The document (or a section of it) is not a JSON object.
    #[error("expected an object at '{0}'")]
    NotAnObject(String),

    /// `$schema` names a format this canonicalizer does not understand.
    #[error("unsupported scenario schema '{0}'")]
    UnsupportedSchema(String),

    /// A field holds a value of the wrong kind.
    #[error("invalid value at '{path}': expected {expected}")]
    InvalidField {
        path: String,
        expected: &'static str,
    },

    /// A human time period could not be parsed.
    #[error("invalid time period '{0}'")]
    InvalidPeriod(String),

    /// A state declares `goto` without `on` or `after`.
    #[error("state '{0}' has a goto but neither 'on' nor 'after'")]
    GotoWithoutTrigger(String),

    /// A transition has neither an `on` action nor an `after` period.
    #[error("transition {index} of state '{state}' needs 'on' or 'after'")]
    InvalidTransition { state: String, index: usize },

    /// A synthesized `<state>.<action>` key collides with an explicit action.
    #[error("implicit action '{0}' collides with an explicitly declared action")]
    ActionCollision(String),

    /// A `goto` target is not a declared state and not an end-state name.
    #[error("state '{state}' transitions to unknown state '{target}'")]
    UnknownState { state: String, target: String },

    /// The scenario has no `initial` state to start from.
    #[error("scenario has no 'initial' state")]
    MissingInitialState,

    /// An update instruction is malformed.
    #[error("invalid update instruction in action '{action}': {reason}")]
    InvalidUpdate { action: String, reason: String },

    /// Serialization of the normalized document failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
