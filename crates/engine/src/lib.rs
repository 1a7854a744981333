//! `engine` crate — the process runtime.
//!
//! Instantiates scenarios into processes, advances them through `step` and
//! `timeout`, predicts their future states and rebuilds them from their
//! hash-chained event logs.

pub mod error;
pub mod event;
pub mod executor;
pub mod models;
pub mod notify;
pub mod predict;
pub mod replay;
pub mod state;
pub mod update;

pub use error::EngineError;
pub use event::{ActionEvent, Event, InstantiateEvent, TimeoutEvent};
pub use executor::{EngineConfig, ProcessEngine};
pub use models::{
    ActorRef, AvailableAction, LogEntry, PredictedState, Process, StartInstructions, State,
    StateNotify,
};
pub use notify::{create_message, determine_trigger, NotifyMessage};
pub use state::instantiate_state;
