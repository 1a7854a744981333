//! The canonicalizer: authored scenario → [`NormalizedScenario`].
//!
//! Normalization is a pure function of the input document. It runs in this
//! order:
//! 1. document-level fields, actors, explicit actions;
//! 2. state shorthand (`on`/`after` + `goto`) → `transitions`;
//! 3. merge of the `"*"` wildcard state into every non-end state;
//! 4. per state: transitions, implicit actions, implicit notify entries;
//! 5. implicit end states for unresolved `(…)` goto targets.
//!
//! Running it on its own output is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::actor::service_name;
use crate::models::{
    is_end_state, short_action_key, ActionTransition, NormalizedAction, NormalizedScenario,
    NormalizedState, Notify, TimeoutTransition, Transition, TransitionLog, UpdateInstruction,
    UpdateMode, SCENARIO_SCHEMA,
};
use crate::period::parse_period;
use crate::schema::{normalize_actor_schema, normalize_schema};
use crate::ScenarioError;

const WILDCARD_STATE: &str = "*";
const INITIAL_STATE: &str = "initial";
const TRANSITION_KEYS: [&str; 6] = ["on", "by", "after", "goto", "if", "log"];

/// Compile an authored scenario document into its canonical form.
///
/// # Errors
/// Returns a [`ScenarioError`] describing the first structural defect found:
/// an unsupported `$schema`, an invalid time period, a `goto` without `on` or
/// `after`, an implicit action colliding with an explicit one, an unknown
/// goto target, a missing `initial` state or a malformed field.
pub fn normalize(input: &Value) -> Result<NormalizedScenario, ScenarioError> {
    let doc = input
        .as_object()
        .ok_or_else(|| ScenarioError::NotAnObject("$".into()))?;

    let schema = normalize_schema_uri(doc.get("$schema"))?;
    let title = optional_string(doc, "title", "")?;
    let description = optional_string(doc, "description", "")?;
    let tags = string_list(doc.get("tags"), "tags")?.unwrap_or_default();
    let actors = normalize_actors(doc.get("actors"))?;
    let mut actions = normalize_actions(doc.get("actions"))?;
    let explicit: BTreeSet<String> = actions.keys().cloned().collect();

    let mut states = BTreeMap::new();
    for (key, authored) in expand_states(doc.get("states"))? {
        let state = normalize_state(&key, authored, &actors, &explicit, &mut actions)?;
        states.insert(key, state);
    }
    synthesize_end_states(&mut states)?;
    if !states.contains_key(INITIAL_STATE) {
        return Err(ScenarioError::MissingInitialState);
    }

    let vars = normalize_schema_map(doc.get("vars"), "vars")?;
    let defs = normalize_schema_map(doc.get("$defs"), "$defs")?;
    let result = normalize_schema(doc.get("result").unwrap_or(&Value::Null));

    debug!(
        "normalized scenario '{}': {} actors, {} actions, {} states",
        title,
        actors.len(),
        actions.len(),
        states.len()
    );

    Ok(NormalizedScenario {
        schema,
        title,
        description,
        tags,
        actors,
        actions,
        states,
        vars,
        result,
        defs,
    })
}

// ---------------------------------------------------------------------------
// Document-level fields
// ---------------------------------------------------------------------------

fn normalize_schema_uri(value: Option<&Value>) -> Result<String, ScenarioError> {
    match value {
        None | Some(Value::Null) => Ok(SCENARIO_SCHEMA.to_owned()),
        Some(Value::String(uri))
            if uri == SCENARIO_SCHEMA
                || uri.strip_suffix(".json") == Some(SCENARIO_SCHEMA)
                || uri.strip_suffix(".yaml") == Some(SCENARIO_SCHEMA) =>
        {
            Ok(SCENARIO_SCHEMA.to_owned())
        }
        Some(Value::String(uri)) => Err(ScenarioError::UnsupportedSchema(uri.clone())),
        Some(other) => Err(ScenarioError::UnsupportedSchema(other.to_string())),
    }
}

fn optional_string(
    map: &Map<String, Value>,
    key: &str,
    default: &str,
) -> Result<String, ScenarioError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default.to_owned()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ScenarioError::InvalidField {
            path: key.to_owned(),
            expected: "a string",
        }),
    }
}

/// A string or a list of strings.
fn string_list(value: Option<&Value>, path: &str) -> Result<Option<Vec<String>>, ScenarioError> {
    let invalid = || ScenarioError::InvalidField {
        path: path.to_owned(),
        expected: "a string or a list of strings",
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

fn object_or_empty(value: Option<&Value>, path: &str) -> Result<Map<String, Value>, ScenarioError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ScenarioError::NotAnObject(path.to_owned())),
    }
}

fn normalize_actors(value: Option<&Value>) -> Result<BTreeMap<String, Value>, ScenarioError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::from([(
            "actor".to_owned(),
            normalize_actor_schema(&Value::Null),
        )])),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(key, schema)| (key.clone(), normalize_actor_schema(schema)))
            .collect()),
        Some(_) => Err(ScenarioError::NotAnObject("actors".into())),
    }
}

fn normalize_schema_map(
    value: Option<&Value>,
    path: &str,
) -> Result<BTreeMap<String, Value>, ScenarioError> {
    Ok(object_or_empty(value, path)?
        .iter()
        .map(|(key, schema)| (key.clone(), normalize_schema(schema)))
        .collect())
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

fn normalize_actions(
    value: Option<&Value>,
) -> Result<BTreeMap<String, NormalizedAction>, ScenarioError> {
    object_or_empty(value, "actions")?
        .iter()
        .map(|(key, action)| Ok((key.clone(), normalize_action(key, action)?)))
        .collect()
}

fn normalize_action(key: &str, value: &Value) -> Result<NormalizedAction, ScenarioError> {
    let path = format!("actions.{key}");
    let map = object_or_empty(Some(value), &path)?;

    Ok(NormalizedAction {
        title: optional_string(&map, "title", key)?,
        description: optional_string(&map, "description", "")?,
        actor: string_list(map.get("actor"), &format!("{path}.actor"))?
            .unwrap_or_else(|| vec!["*".to_owned()]),
        condition: map.get("if").cloned().unwrap_or(Value::Bool(true)),
        response: normalize_schema(map.get("response").unwrap_or(&Value::Null)),
        update: normalize_updates(key, map.get("update"))?,
    })
}

fn default_update_value() -> Value {
    json!({ "<ref>": "current.response" })
}

fn normalize_updates(
    action: &str,
    value: Option<&Value>,
) -> Result<Vec<UpdateInstruction>, ScenarioError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| normalize_update(action, item))
            .collect(),
        Some(single) => Ok(vec![normalize_update(action, single)?]),
    }
}

fn normalize_update(action: &str, value: &Value) -> Result<UpdateInstruction, ScenarioError> {
    let invalid = |reason: String| ScenarioError::InvalidUpdate {
        action: action.to_owned(),
        reason,
    };

    let map = match value {
        Value::String(target) => {
            let mut map = Map::new();
            map.insert("set".into(), Value::String(target.clone()));
            map
        }
        Value::Object(map) => map.clone(),
        other => return Err(invalid(format!("expected a target or an object, got {other}"))),
    };

    let set = map
        .get("set")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'set' target".into()))?
        .to_owned();

    let mode = match map.get("mode") {
        None | Some(Value::Null) => UpdateMode::default(),
        Some(mode) => serde_json::from_value(mode.clone())
            .map_err(|_| invalid(format!("unknown mode {mode}")))?,
    };

    Ok(UpdateInstruction {
        set,
        value: map.get("value").cloned().unwrap_or_else(default_update_value),
        stub: map.get("stub").cloned(),
        mode,
        condition: map.get("if").cloned().unwrap_or(Value::Bool(true)),
    })
}

// ---------------------------------------------------------------------------
// States: shorthand expansion and wildcard merge
// ---------------------------------------------------------------------------

/// A state with its shorthand transition folded into `transitions`.
struct AuthoredState {
    fields: Map<String, Value>,
    transitions: Vec<Value>,
}

fn expand_states(value: Option<&Value>) -> Result<BTreeMap<String, AuthoredState>, ScenarioError> {
    let mut states = BTreeMap::new();
    for (key, state) in object_or_empty(value, "states")? {
        let authored = authored_state(&key, &state)?;
        states.insert(key, authored);
    }

    if let Some(wildcard) = states.remove(WILDCARD_STATE) {
        for (_, state) in states.iter_mut().filter(|(key, _)| !is_end_state(key)) {
            merge_wildcard(state, &wildcard);
        }
    }

    Ok(states)
}

fn authored_state(key: &str, value: &Value) -> Result<AuthoredState, ScenarioError> {
    let mut fields = object_or_empty(Some(value), &format!("states.{key}"))?;

    let mut transitions = match fields.remove("transitions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) => list,
        Some(_) => {
            return Err(ScenarioError::InvalidField {
                path: format!("states.{key}.transitions"),
                expected: "a list of transitions",
            })
        }
    };

    if fields.contains_key("on") || fields.contains_key("after") {
        let shorthand: Map<String, Value> = TRANSITION_KEYS
            .iter()
            .filter_map(|&k| fields.remove(k).map(|v| (k.to_owned(), v)))
            .collect();
        transitions.insert(0, Value::Object(shorthand));
    } else if fields.contains_key("goto") {
        return Err(ScenarioError::GotoWithoutTrigger(key.to_owned()));
    }

    Ok(AuthoredState {
        fields,
        transitions,
    })
}

fn merge_wildcard(state: &mut AuthoredState, wildcard: &AuthoredState) {
    state
        .transitions
        .extend(wildcard.transitions.iter().cloned());

    for (key, value) in &wildcard.fields {
        match (key.as_str(), state.fields.get_mut(key), value) {
            ("instructions", Some(Value::Object(own)), Value::Object(shared)) => {
                for (actor, text) in shared {
                    own.entry(actor.clone()).or_insert_with(|| text.clone());
                }
            }
            (_, None, _) => {
                state.fields.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// States: transitions, implicit actions, notify
// ---------------------------------------------------------------------------

enum Trigger {
    On { action: String, by: Option<Vec<String>> },
    After(u64),
}

struct DraftTransition {
    trigger: Trigger,
    goto: Option<String>,
    condition: Value,
    log: Option<Value>,
}

fn normalize_state(
    key: &str,
    authored: AuthoredState,
    actors: &BTreeMap<String, Value>,
    explicit: &BTreeSet<String>,
    actions: &mut BTreeMap<String, NormalizedAction>,
) -> Result<NormalizedState, ScenarioError> {
    if is_end_state(key) && !authored.transitions.is_empty() {
        return Err(ScenarioError::InvalidField {
            path: format!("states.{key}.transitions"),
            expected: "no transitions on an end state",
        });
    }

    let mut drafts = Vec::with_capacity(authored.transitions.len());
    let mut implicit: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (index, value) in authored.transitions.iter().enumerate() {
        let mut draft = draft_transition(key, index, value)?;
        if let Trigger::On { action, by } = &mut draft.trigger {
            if !actions.contains_key(action.as_str()) {
                let full = format!("{key}.{action}");
                if explicit.contains(&full) {
                    return Err(ScenarioError::ActionCollision(full));
                }
                let allowed = implicit.entry(full.clone()).or_default();
                for actor in expand_actor_filter(by.as_deref(), actors) {
                    if !allowed.contains(&actor) {
                        allowed.push(actor);
                    }
                }
                *action = full;
            }
        }
        drafts.push(draft);
    }

    for (full, actor) in implicit {
        let title = short_action_key(key, &full).to_owned();
        actions.insert(
            full,
            NormalizedAction {
                title,
                description: String::new(),
                actor,
                condition: Value::Bool(true),
                response: json!({}),
                update: Vec::new(),
            },
        );
    }

    let transitions = drafts
        .into_iter()
        .map(|draft| finish_transition(draft, actions))
        .collect::<Result<Vec<_>, _>>()?;

    let mut notify = normalize_notify(authored.fields.get("notify"), key)?;
    synthesize_notify(key, &transitions, actions, &mut notify);

    let instructions = object_or_empty(
        authored.fields.get("instructions"),
        &format!("states.{key}.instructions"),
    )?
    .into_iter()
    .collect();

    Ok(NormalizedState {
        title: authored
            .fields
            .get("title")
            .cloned()
            .unwrap_or_else(|| Value::String(key.to_owned())),
        description: authored
            .fields
            .get("description")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
        instructions,
        notify,
        transitions,
    })
}

fn draft_transition(
    state: &str,
    index: usize,
    value: &Value,
) -> Result<DraftTransition, ScenarioError> {
    let path = format!("states.{state}.transitions[{index}]");
    let map = value
        .as_object()
        .ok_or_else(|| ScenarioError::NotAnObject(path.clone()))?;

    let goto = match map.get("goto") {
        None | Some(Value::Null) => None,
        Some(Value::String(target)) => Some(target.clone()),
        Some(_) => {
            return Err(ScenarioError::InvalidField {
                path: format!("{path}.goto"),
                expected: "a state name",
            })
        }
    };

    let trigger = if let Some(on) = map.get("on") {
        let action = on.as_str().ok_or_else(|| ScenarioError::InvalidField {
            path: format!("{path}.on"),
            expected: "an action name",
        })?;
        Trigger::On {
            action: action.to_owned(),
            by: string_list(map.get("by"), &format!("{path}.by"))?,
        }
    } else if let Some(after) = map.get("after") {
        Trigger::After(parse_period(after)?)
    } else {
        return Err(ScenarioError::InvalidTransition {
            state: state.to_owned(),
            index,
        });
    };

    Ok(DraftTransition {
        trigger,
        goto,
        condition: map.get("if").cloned().unwrap_or(Value::Bool(true)),
        log: map.get("log").cloned(),
    })
}

/// Actors allowed by a `by` filter; no filter or `*` means every declared actor.
fn expand_actor_filter(by: Option<&[String]>, actors: &BTreeMap<String, Value>) -> Vec<String> {
    match by {
        None => actors.keys().cloned().collect(),
        Some(entries) => entries
            .iter()
            .flat_map(|entry| {
                if entry == "*" {
                    actors.keys().cloned().collect::<Vec<_>>()
                } else {
                    vec![entry.clone()]
                }
            })
            .collect(),
    }
}

fn finish_transition(
    draft: DraftTransition,
    actions: &BTreeMap<String, NormalizedAction>,
) -> Result<Transition, ScenarioError> {
    match draft.trigger {
        Trigger::On { action, by } => {
            let default_log = actions
                .get(&action)
                .map(|a| TransitionLog {
                    title: Value::String(a.title.clone()),
                    description: Value::String(a.description.clone()),
                    condition: Value::Bool(true),
                })
                .unwrap_or_else(|| disabled_log());
            Ok(Transition::Action(ActionTransition {
                on: action,
                by,
                goto: draft.goto,
                condition: draft.condition,
                log: normalize_log(draft.log.as_ref(), default_log)?,
            }))
        }
        Trigger::After(after) => Ok(Transition::Timeout(TimeoutTransition {
            after,
            goto: draft.goto,
            condition: draft.condition,
            log: normalize_log(draft.log.as_ref(), disabled_log())?,
        })),
    }
}

fn disabled_log() -> TransitionLog {
    TransitionLog {
        title: Value::String(String::new()),
        description: Value::String(String::new()),
        condition: Value::Bool(false),
    }
}

fn normalize_log(
    authored: Option<&Value>,
    default: TransitionLog,
) -> Result<TransitionLog, ScenarioError> {
    match authored {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(enabled)) => Ok(TransitionLog {
            condition: Value::Bool(*enabled),
            ..default
        }),
        Some(Value::Object(map)) => Ok(TransitionLog {
            title: map.get("title").cloned().unwrap_or(default.title),
            description: map
                .get("description")
                .cloned()
                .unwrap_or(default.description),
            condition: map.get("if").cloned().unwrap_or(Value::Bool(true)),
        }),
        Some(_) => Err(ScenarioError::InvalidField {
            path: "log".into(),
            expected: "false or a log object",
        }),
    }
}

fn normalize_notify(value: Option<&Value>, state: &str) -> Result<Vec<Notify>, ScenarioError> {
    let path = format!("states.{state}.notify");
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(|item| notify_entry(item, &path)).collect(),
        Some(single) => Ok(vec![notify_entry(single, &path)?]),
    }
}

fn notify_entry(value: &Value, path: &str) -> Result<Notify, ScenarioError> {
    let service_of = |s: &str| service_name(s).unwrap_or(s).to_owned();
    match value {
        Value::String(service) => Ok(Notify {
            service: service_of(service),
            trigger: None,
            condition: Value::Bool(true),
            message: None,
        }),
        Value::Object(map) => {
            let service = map
                .get("service")
                .and_then(Value::as_str)
                .ok_or_else(|| ScenarioError::InvalidField {
                    path: format!("{path}.service"),
                    expected: "a service name",
                })?;
            let trigger = match map.get("trigger") {
                None | Some(Value::Null) => None,
                Some(Value::String(action)) => Some(action.clone()),
                Some(_) => {
                    return Err(ScenarioError::InvalidField {
                        path: format!("{path}.trigger"),
                        expected: "an action name",
                    })
                }
            };
            Ok(Notify {
                service: service_of(service),
                trigger,
                condition: map.get("if").cloned().unwrap_or(Value::Bool(true)),
                message: map.get("message").filter(|m| !m.is_null()).cloned(),
            })
        }
        _ => Err(ScenarioError::InvalidField {
            path: path.to_owned(),
            expected: "a service name or a notify object",
        }),
    }
}

/// Add a notify entry for every `service:` actor of the state's actions that
/// is not notified explicitly. The trigger is set only when exactly one action
/// maps to the service.
fn synthesize_notify(
    state: &str,
    transitions: &[Transition],
    actions: &BTreeMap<String, NormalizedAction>,
    notify: &mut Vec<Notify>,
) {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for transition in transitions.iter().filter_map(Transition::as_action) {
        let Some(action) = actions.get(&transition.on) else {
            continue;
        };
        let short = short_action_key(state, &transition.on).to_owned();
        for service in action.actor.iter().filter_map(|a| service_name(a)) {
            match groups.iter_mut().find(|(name, _)| name == service) {
                Some((_, keys)) if !keys.contains(&short) => keys.push(short.clone()),
                Some(_) => {}
                None => groups.push((service.to_owned(), vec![short.clone()])),
            }
        }
    }

    for (service, keys) in groups {
        if notify.iter().any(|n| n.service == service) {
            continue;
        }
        let trigger = match keys.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        notify.push(Notify {
            service,
            trigger,
            condition: Value::Bool(true),
            message: None,
        });
    }
}

fn synthesize_end_states(
    states: &mut BTreeMap<String, NormalizedState>,
) -> Result<(), ScenarioError> {
    let targets: Vec<(String, String)> = states
        .iter()
        .flat_map(|(key, state)| {
            state
                .transitions
                .iter()
                .filter_map(Transition::goto)
                .map(move |target| (key.clone(), target.to_owned()))
        })
        .collect();

    for (state, target) in targets {
        if states.contains_key(&target) {
            continue;
        }
        if !is_end_state(&target) {
            return Err(ScenarioError::UnknownState { state, target });
        }
        let end = NormalizedState::end(&target);
        states.insert(target, end);
    }
    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(scenario: &NormalizedScenario) -> NormalizedScenario {
        let value = serde_json::to_value(scenario).expect("serializable");
        normalize(&value).expect("normalized output must normalize")
    }

    #[test]
    fn minimal_scenario_gets_defaults() {
        let scenario = normalize(&json!({
            "states": { "initial": { "on": "complete", "goto": "(done)" } }
        }))
        .unwrap();

        assert_eq!(scenario.schema, SCENARIO_SCHEMA);
        assert_eq!(scenario.actors.keys().collect::<Vec<_>>(), vec!["actor"]);

        let action = &scenario.actions["initial.complete"];
        assert_eq!(action.title, "complete");
        assert_eq!(action.actor, vec!["actor"]);

        let initial = &scenario.states["initial"];
        assert_eq!(initial.title, json!("initial"));
        let transition = initial.transitions[0].as_action().unwrap();
        assert_eq!(transition.on, "initial.complete");
        assert_eq!(transition.goto.as_deref(), Some("(done)"));
        assert_eq!(transition.condition, json!(true));
        assert_eq!(transition.log.title, json!("complete"));
        assert_eq!(transition.log.condition, json!(true));

        let done = &scenario.states["(done)"];
        assert!(done.transitions.is_empty());
    }

    #[test]
    fn timeout_shorthand_converts_periods() {
        let scenario = normalize(&json!({
            "states": { "initial": { "after": "3 minutes", "goto": "(done)" } }
        }))
        .unwrap();

        let timeout = scenario.states["initial"].transitions[0].as_timeout().unwrap();
        assert_eq!(timeout.after, 180);
        assert_eq!(timeout.log.condition, json!(false));
    }

    #[test]
    fn structural_defects_are_errors() {
        assert!(matches!(
            normalize(&json!({ "$schema": "https://example.com/other", "states": {} })),
            Err(ScenarioError::UnsupportedSchema(_))
        ));
        assert!(matches!(
            normalize(&json!({ "states": { "initial": { "goto": "(done)" } } })),
            Err(ScenarioError::GotoWithoutTrigger(state)) if state == "initial"
        ));
        assert!(matches!(
            normalize(&json!({ "states": { "initial": { "after": "2 fortnights", "goto": "(done)" } } })),
            Err(ScenarioError::InvalidPeriod(_))
        ));
        assert!(matches!(
            normalize(&json!({ "states": { "initial": { "on": "go", "goto": "nowhere" } } })),
            Err(ScenarioError::UnknownState { target, .. }) if target == "nowhere"
        ));
        assert!(matches!(
            normalize(&json!({ "states": { "start": { "on": "go", "goto": "(done)" } } })),
            Err(ScenarioError::MissingInitialState)
        ));
    }

    #[test]
    fn implicit_action_colliding_with_explicit_key_is_rejected() {
        let result = normalize(&json!({
            "actions": { "initial.go": { "title": "explicit" } },
            "states": { "initial": { "on": "go", "goto": "(done)" } }
        }));
        assert!(matches!(result, Err(ScenarioError::ActionCollision(key)) if key == "initial.go"));
    }

    #[test]
    fn explicit_actions_are_referenced_directly() {
        let scenario = normalize(&json!({
            "actions": { "approve": { "actor": "manager", "response": "boolean" } },
            "actors": { "manager": null, "employee": null },
            "states": { "initial": { "on": "approve", "goto": "(approved)" } }
        }))
        .unwrap();

        assert!(!scenario.actions.contains_key("initial.approve"));
        let approve = &scenario.actions["approve"];
        assert_eq!(approve.actor, vec!["manager"]);
        assert_eq!(approve.response, json!({ "type": "boolean" }));
        let transition = scenario.states["initial"].transitions[0].as_action().unwrap();
        assert_eq!(transition.on, "approve");
    }

    #[test]
    fn implicit_action_actors_are_the_union_of_by_filters() {
        let scenario = normalize(&json!({
            "actors": { "client": null, "supplier": null, "signer_*": null },
            "states": {
                "initial": {
                    "transitions": [
                        { "on": "sign", "by": "client", "goto": "signed" },
                        { "on": "sign", "by": ["signer_1", "service:docs"], "goto": "signed" },
                        { "on": "cancel", "goto": "(cancelled)" }
                    ]
                },
                "signed": { "on": "close", "by": "*", "goto": "(done)" }
            }
        }))
        .unwrap();

        assert_eq!(
            scenario.actions["initial.sign"].actor,
            vec!["client", "signer_1", "service:docs"]
        );
        assert_eq!(
            scenario.actions["initial.cancel"].actor,
            vec!["client", "signer_*", "supplier"]
        );
        assert_eq!(
            scenario.actions["signed.close"].actor,
            vec!["client", "signer_*", "supplier"]
        );
        assert!(scenario.states.contains_key("(cancelled)"));
    }

    #[test]
    fn notify_entries_are_synthesized_per_service() {
        let scenario = normalize(&json!({
            "actions": {
                "check": { "actor": ["service:robot"] },
                "verify": { "actor": ["service:robot"] },
                "mail": { "actor": ["service:email", "client"] }
            },
            "actors": { "client": null },
            "states": {
                "initial": {
                    "transitions": [
                        { "on": "check", "goto": "second" },
                        { "on": "verify", "goto": "second" },
                        { "on": "mail", "goto": "second" }
                    ]
                },
                "second": {
                    "notify": "service:audit",
                    "on": "mail", "goto": "(done)"
                }
            }
        }))
        .unwrap();

        let initial = &scenario.states["initial"].notify;
        assert_eq!(initial.len(), 2);
        assert_eq!(initial[0].service, "robot");
        assert_eq!(initial[0].trigger, None);
        assert_eq!(initial[1].service, "email");
        assert_eq!(initial[1].trigger.as_deref(), Some("mail"));

        let second = &scenario.states["second"].notify;
        assert_eq!(second[0].service, "audit");
        assert_eq!(second[1].service, "email");
    }

    #[test]
    fn wildcard_state_is_merged_and_removed() {
        let scenario = normalize(&json!({
            "states": {
                "*": {
                    "description": "shared",
                    "instructions": { "actor": "generic", "service:x": "ping" },
                    "transitions": [ { "on": "cancel", "goto": "(cancelled)" } ]
                },
                "initial": {
                    "instructions": { "actor": "specific" },
                    "on": "next", "goto": "second"
                },
                "second": { "title": "Second", "on": "finish", "goto": "(done)" }
            }
        }))
        .unwrap();

        assert!(!scenario.states.contains_key("*"));
        let initial = &scenario.states["initial"];
        assert_eq!(initial.transitions.len(), 2);
        assert_eq!(initial.transitions[1].as_action().unwrap().on, "initial.cancel");
        assert_eq!(initial.instructions["actor"], json!("specific"));
        assert_eq!(initial.instructions["service:x"], json!("ping"));
        assert_eq!(initial.description, json!("shared"));

        let second = &scenario.states["second"];
        assert_eq!(second.title, json!("Second"));
        assert_eq!(second.transitions[1].as_action().unwrap().on, "second.cancel");
        assert!(scenario.states["(cancelled)"].transitions.is_empty());
        assert!(scenario.states["(done)"].transitions.is_empty());
    }

    #[test]
    fn log_policy_overrides() {
        let scenario = normalize(&json!({
            "actions": { "pay": { "title": "Pay", "description": "Pay the bill" } },
            "states": {
                "initial": {
                    "transitions": [
                        { "on": "pay", "goto": "(done)", "log": false },
                        { "on": "pay", "goto": "(done)", "log": { "title": "Paid" } },
                        { "after": "1 day", "goto": "(expired)", "log": { "title": "Expired" } }
                    ]
                }
            }
        }))
        .unwrap();

        let transitions = &scenario.states["initial"].transitions;
        assert_eq!(transitions[0].log().condition, json!(false));
        assert_eq!(transitions[0].log().title, json!("Pay"));
        assert_eq!(transitions[1].log().title, json!("Paid"));
        assert_eq!(transitions[1].log().description, json!("Pay the bill"));
        assert_eq!(transitions[2].log().title, json!("Expired"));
        assert_eq!(transitions[2].log().condition, json!(true));
    }

    #[test]
    fn update_shorthand_is_expanded() {
        let scenario = normalize(&json!({
            "actions": {
                "a": { "update": "vars.answer" },
                "b": { "update": { "set": "result", "mode": "merge", "stub": { "ok": true } } }
            },
            "states": { "initial": { "on": "a", "goto": "(done)" } }
        }))
        .unwrap();

        let a = &scenario.actions["a"].update[0];
        assert_eq!(a.set, "vars.answer");
        assert_eq!(a.value, json!({ "<ref>": "current.response" }));
        assert_eq!(a.mode, UpdateMode::Replace);
        let b = &scenario.actions["b"].update[0];
        assert_eq!(b.mode, UpdateMode::Merge);
        assert_eq!(b.stub, Some(json!({ "ok": true })));

        let bad = normalize(&json!({
            "actions": { "a": { "update": { "set": "vars.x", "mode": "overwrite" } } },
            "states": { "initial": { "on": "a", "goto": "(done)" } }
        }));
        assert!(matches!(bad, Err(ScenarioError::InvalidUpdate { .. })));
    }

    #[test]
    fn normalize_is_idempotent() {
        let scenario = normalize(&json!({
            "title": "Quote",
            "tags": "sales",
            "actors": {
                "client": { "properties": { "name": { "type": "string", "!required": true } } },
                "signer_*": "#/$defs/signer",
                "service:email": null
            },
            "actions": {
                "request": { "actor": "client", "response": { "type": "object", "properties": { "amount": "number" } }, "update": "vars.amount" }
            },
            "vars": { "amount": "number" },
            "result": "string",
            "states": {
                "*": { "transitions": [ { "on": "cancel", "by": "client", "goto": "(cancelled)" } ] },
                "initial": { "on": "request", "goto": "review" },
                "review": {
                    "title": { "<tpl>": "Review {{ vars.amount }}" },
                    "transitions": [
                        { "on": "accept", "by": ["signer_1", "service:email"], "goto": "(done)" },
                        { "after": "5 minutes", "goto": "(expired)" }
                    ]
                }
            }
        }))
        .unwrap();

        assert_eq!(roundtrip(&scenario), scenario);
    }
}
