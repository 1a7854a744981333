//! `scenario` crate — the scenario document model and its canonicalizer.
//!
//! Authored scenarios are sparse: shorthand transitions, bare-string schemas,
//! implicit actions and end states. [`normalize`] compiles such a document
//! into a fully explicit [`NormalizedScenario`], the only form the runtime
//! consumes.

pub mod actor;
pub mod error;
pub mod hash;
pub mod models;
pub mod normalize;
pub mod period;
pub mod schema;

pub use error::ScenarioError;
pub use hash::{canonical_json, scenario_id};
pub use models::{
    ActionTransition, NormalizedAction, NormalizedScenario, NormalizedState, Notify,
    TimeoutTransition, Transition, TransitionLog, UpdateInstruction, UpdateMode,
    SCENARIO_SCHEMA,
};
pub use normalize::normalize;
pub use period::parse_period;
