//! Helpers for notification transports.
//!
//! Delivery is up to the caller. These functions only describe what a
//! `service:<name>` actor should be told about the current state, and map a
//! service's reply back to an action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AvailableAction, Process};

/// What a service is told about the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    /// Actions the service may perform.
    pub actions: Vec<AvailableAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

pub fn create_message(process: &Process, service: &str) -> NotifyMessage {
    let actor = format!("service:{service}");
    NotifyMessage {
        actions: service_actions(process, &actor).cloned().collect(),
        instructions: process.current.instructions.get(&actor).cloned(),
    }
}

/// The action a service reply should be stepped as.
///
/// The state's notify entry decides when it names a trigger. Otherwise an
/// object response may pick one of the service's actions through its
/// `action` field.
pub fn determine_trigger(process: &Process, service: &str, response: Option<&Value>) -> Option<String> {
    let configured = process
        .current
        .notify
        .iter()
        .find(|n| n.service == service)
        .and_then(|n| n.trigger.clone());
    if configured.is_some() {
        return configured;
    }

    let requested = response?.get("action")?.as_str()?;
    let actor = format!("service:{service}");
    let offered = service_actions(process, &actor).any(|a| a.key == requested);
    offered.then(|| requested.to_owned())
}

fn service_actions<'a>(
    process: &'a Process,
    actor: &'a str,
) -> impl Iterator<Item = &'a AvailableAction> + 'a {
    process
        .current
        .actions
        .iter()
        .filter(move |a| a.actor.iter().any(|entry| entry == actor))
}
