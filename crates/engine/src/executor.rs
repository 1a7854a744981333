//! Process execution engine.
//!
//! `ProcessEngine` is the central orchestrator:
//! 1. `instantiate` builds the genesis event and the initial state.
//! 2. `step` validates an action attempt and either advances the process or
//!    records a skipped event.
//! 3. `timeout` takes the first due timeout transition, if any.
//!
//! Every operation returns a new [`Process`]; its input is never modified.
//! The clock is sampled once per operation and threaded through.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use schema::ValidationContext;
use scenario::actor::{matches_actor, service_name, template_name};
use scenario::schema::schema_default;
use scenario::{scenario_id, NormalizedScenario, TransitionLog};

use crate::event::{ActionEvent, Event, InstantiateEvent, TimeoutEvent};
use crate::models::{ActorRef, LogEntry, Process, StartInstructions, State};
use crate::state::{eval_context, instantiate_state, text, truthy};
use crate::update::apply_updates;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of states [`ProcessEngine::predict`] may produce.
    pub predict_max: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { predict_max: 100 }
    }
}

// ---------------------------------------------------------------------------
// Step outcome
// ---------------------------------------------------------------------------

/// Result of deciding an action attempt.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The advanced process, with its action event appended.
    Accepted(Box<Process>),
    /// Deterministic reasons the attempt was skipped.
    Rejected(Vec<String>),
}

// ---------------------------------------------------------------------------
// ProcessEngine
// ---------------------------------------------------------------------------

/// Runs processes of one scenario version.
///
/// The validation context is compiled once per scenario version (see
/// [`ValidationContext::compile`]) and shared by every call.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    pub(crate) validation: Arc<ValidationContext>,
    pub(crate) config: EngineConfig,
}

impl ProcessEngine {
    /// Create a new engine.
    pub fn new(validation: Arc<ValidationContext>, config: EngineConfig) -> Self {
        Self { validation, config }
    }

    /// An engine for `scenario` using the default validator and no remote
    /// schemas.
    ///
    /// # Errors
    /// Fails only if the scenario cannot be serialized.
    pub fn for_scenario(scenario: &NormalizedScenario) -> Result<Self, EngineError> {
        let root = serde_json::to_value(scenario)?;
        Ok(Self::new(
            Arc::new(ValidationContext::with_default_validator(root)),
            EngineConfig::default(),
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // instantiate
    // -----------------------------------------------------------------------

    /// Start a new process in state `initial`.
    ///
    /// # Errors
    /// `InvalidStart` if the resolved actors or vars do not conform to their
    /// schemas; scenario defects otherwise.
    #[instrument(skip(self, scenario, start), fields(title = %scenario.title))]
    pub fn instantiate(
        &self,
        scenario: &NormalizedScenario,
        start: StartInstructions,
    ) -> Result<Process, EngineError> {
        let event = Event::from(InstantiateEvent {
            id: start.id.unwrap_or_else(Uuid::new_v4),
            timestamp: start.timestamp.unwrap_or_else(Utc::now),
            scenario: scenario_id(scenario)?,
            actors: start.actors,
            vars: start.vars,
            hash: String::new(),
        })
        .seal()?;

        let process = self.genesis(scenario, &event)?;
        info!("process '{}' instantiated in state '{}'", process.id, process.current.key);
        Ok(process)
    }

    /// Build a process from its genesis event.
    pub(crate) fn genesis(
        &self,
        scenario: &NormalizedScenario,
        event: &Event,
    ) -> Result<Process, EngineError> {
        let Event::Instantiate(genesis) = event else {
            return Err(EngineError::MissingGenesis);
        };

        let mut errors = Vec::new();
        let actors = resolve_actors(scenario, &genesis.actors, &mut errors);

        let mut vars: BTreeMap<String, Value> = scenario
            .vars
            .iter()
            .filter_map(|(name, schema)| {
                schema_default(schema).map(|default| (name.clone(), default.clone()))
            })
            .collect();
        vars.extend(genesis.vars.clone());

        let result = schema_default(&scenario.result)
            .cloned()
            .unwrap_or(Value::Null);

        let mut process = Process {
            id: genesis.id,
            title: scenario.title.clone(),
            tags: scenario.tags.clone(),
            scenario_id: genesis.scenario,
            scenario: scenario.clone(),
            actors,
            vars,
            result,
            current: State::default(),
            events: vec![event.clone()],
            log: Vec::new(),
        };

        errors.extend(self.validate_process(&process));
        if !errors.is_empty() {
            warn!("start instructions rejected: {:?}", errors);
            return Err(EngineError::InvalidStart(errors));
        }

        let ctx = eval_context(&process, Value::Null)?;
        process.current = instantiate_state(scenario, "initial", &ctx, genesis.timestamp)?;
        Ok(process)
    }

    // -----------------------------------------------------------------------
    // step
    // -----------------------------------------------------------------------

    /// Perform `action` as `actor` at the current time.
    ///
    /// Business rejections do not fail: the returned process carries a
    /// skipped [`ActionEvent`] listing the reasons.
    ///
    /// # Errors
    /// Only scenario defects (bad update target, broken Fn marker, dangling
    /// state reference).
    pub fn step(
        &self,
        process: &Process,
        action: &str,
        actor: ActorRef,
        response: Option<Value>,
    ) -> Result<Process, EngineError> {
        self.step_at(process, action, actor, response, Utc::now())
    }

    /// [`step`](Self::step) with an explicit timestamp.
    #[instrument(skip(self, process, actor, response), fields(process_id = %process.id, actor_key = %actor.key))]
    pub fn step_at(
        &self,
        process: &Process,
        action: &str,
        actor: ActorRef,
        response: Option<Value>,
        timestamp: DateTime<Utc>,
    ) -> Result<Process, EngineError> {
        let response = response.filter(|r| !r.is_null());
        match self.try_step(process, action, &actor, response.clone(), timestamp, false)? {
            Outcome::Accepted(next) => {
                info!("action '{}' moved process to '{}'", action, next.current.key);
                Ok(*next)
            }
            Outcome::Rejected(errors) => {
                debug!("action '{}' skipped: {:?}", action, errors);
                let mut next = process.clone();
                let event = Event::from(ActionEvent {
                    previous: tail(process),
                    timestamp,
                    action: action.to_owned(),
                    actor,
                    response,
                    skipped: true,
                    errors,
                    hash: String::new(),
                })
                .seal()?;
                next.events.push(event);
                Ok(next)
            }
        }
    }

    /// Decide an action attempt. Shared by `step`, prediction and replay.
    pub(crate) fn try_step(
        &self,
        process: &Process,
        action: &str,
        actor: &ActorRef,
        response: Option<Value>,
        timestamp: DateTime<Utc>,
        predicting: bool,
    ) -> Result<Outcome, EngineError> {
        // An explicit null is the same as no response.
        let response = response.filter(|r| !r.is_null());
        let scenario = &process.scenario;
        let state_key = process.current.key.as_str();

        let Some(available) = process.current.action(action) else {
            return Ok(Outcome::Rejected(vec![format!(
                "action '{action}' is not available in state '{state_key}'"
            )]));
        };
        let full_key = scenario.resolve_action_key(state_key, action);
        let definition = scenario
            .actions
            .get(&full_key)
            .ok_or_else(|| EngineError::MissingAction(full_key.clone()))?;

        // ------------------------------------------------------------------
        // Actor checks
        // ------------------------------------------------------------------
        let service = service_name(&actor.key).is_some();
        let instance = match process.actors.get(&actor.key) {
            Some(instance) => instance.clone(),
            None if service => Value::Object(Map::new()),
            None => return Ok(Outcome::Rejected(vec![format!("unknown actor '{}'", actor.key)])),
        };

        let mut errors = Vec::new();
        let bound_id = instance.get("id").and_then(Value::as_str);
        if !predicting && !service {
            match (&actor.id, bound_id) {
                (Some(id), Some(bound)) if id != bound => {
                    errors.push(format!("actor '{}' is bound to a different id", actor.key));
                }
                (None, None) if instance.get("role").map_or(true, Value::is_null) => {
                    errors.push(format!("actor '{}' is not assigned", actor.key));
                }
                _ => {}
            }
        }
        if !is_authorized(&available.actor, &actor.key, &instance, predicting) {
            errors.push(format!(
                "actor '{}' is not allowed to perform action '{action}'",
                actor.key
            ));
        }

        // ------------------------------------------------------------------
        // Response
        // ------------------------------------------------------------------
        let response_value = response
            .clone()
            .or_else(|| schema_default(&definition.response).cloned())
            .unwrap_or(Value::Null);
        if !predicting {
            errors.extend(
                self.validation
                    .validate(&definition.response, &response_value)
                    .into_iter()
                    .map(|e| format!("response {e}")),
            );
        }
        if !errors.is_empty() {
            return Ok(Outcome::Rejected(errors));
        }

        // ------------------------------------------------------------------
        // Updates
        // ------------------------------------------------------------------
        let mut actor_value = instance.clone();
        if let Value::Object(map) = &mut actor_value {
            map.insert("key".into(), Value::String(actor.key.clone()));
        }
        let mut current = serde_json::to_value(&process.current)?;
        current["actor"] = actor_value;
        current["response"] = response_value;

        let mut ctx = eval_context(process, current)?;
        apply_updates(&mut ctx, &definition.update, predicting)?;

        let mut next = process.clone();
        let errors = self.absorb(&mut next, &ctx, &actor.key, service, predicting)?;
        if !errors.is_empty() {
            return Ok(Outcome::Rejected(errors));
        }

        // ------------------------------------------------------------------
        // Transition
        // ------------------------------------------------------------------
        let state = scenario
            .states
            .get(state_key)
            .ok_or_else(|| EngineError::MissingState(state_key.to_owned()))?;
        let mut winner = None;
        for transition in state.transitions.iter().filter_map(|t| t.as_action()) {
            if transition.on != full_key {
                continue;
            }
            let by_matches = transition
                .by
                .as_ref()
                .map_or(true, |by| by.iter().any(|p| matches_actor(p, &actor.key)));
            if by_matches && truthy(&transition.condition, &ctx)? {
                winner = Some(transition);
                break;
            }
        }
        let Some(transition) = winner else {
            return Ok(Outcome::Rejected(vec![format!(
                "no transition for action '{action}' from state '{state_key}'"
            )]));
        };

        if let (Some(id), None, false) = (&actor.id, bound_id, service) {
            if let Some(Value::Object(map)) = next.actors.get_mut(&actor.key) {
                map.insert("id".into(), Value::String(id.clone()));
            }
        }

        let event = Event::from(ActionEvent {
            previous: tail(process),
            timestamp,
            action: action.to_owned(),
            actor: actor.clone(),
            response,
            skipped: false,
            errors: Vec::new(),
            hash: String::new(),
        })
        .seal()?;

        let effective = ctx["current"]["response"].clone();
        let entered = match transition.goto {
            Some(_) => timestamp,
            None => process.current.timestamp,
        };
        self.advance(
            &mut next,
            event,
            ctx,
            transition.goto.as_deref(),
            &transition.log,
            Some(actor),
            entered,
        )?;
        next.current.actor = Some(actor.clone());
        next.current.response = Some(effective);
        Ok(Outcome::Accepted(Box::new(next)))
    }

    /// Copy the working context back into `next` and check the process-level
    /// invariants. Returns the violations.
    fn absorb(
        &self,
        next: &mut Process,
        ctx: &Value,
        actor_key: &str,
        service: bool,
        predicting: bool,
    ) -> Result<Vec<String>, EngineError> {
        let mut errors = Vec::new();

        match &ctx["title"] {
            Value::String(title) => next.title = title.clone(),
            _ => errors.push("title must be a string".to_owned()),
        }
        match object_map(&ctx["actors"]) {
            Some(actors) => next.actors = actors,
            None => errors.push("actors must be an object".to_owned()),
        }
        match object_map(&ctx["vars"]) {
            Some(vars) => next.vars = vars,
            None => errors.push("vars must be an object".to_owned()),
        }
        next.result = ctx["result"].clone();

        if !service {
            if let Value::Object(mut actor) = ctx["current"]["actor"].clone() {
                actor.remove("key");
                next.actors.insert(actor_key.to_owned(), Value::Object(actor));
            }
        }

        if !predicting {
            errors.extend(self.validate_process(next));
        }
        Ok(errors)
    }

    /// Schema conformance of actors, vars and result.
    fn validate_process(&self, process: &Process) -> Vec<String> {
        let scenario = &process.scenario;
        let mut errors = Vec::new();

        for (key, instance) in &process.actors {
            match scenario.actor_schema(key) {
                Some(schema) => errors.extend(
                    self.validation
                        .validate(schema, instance)
                        .into_iter()
                        .map(|e| format!("actor '{key}' {e}")),
                ),
                None => errors.push(format!("unknown actor '{key}'")),
            }
        }

        let vars = Value::Object(process.vars.clone().into_iter().collect());
        errors.extend(
            self.validation
                .validate(&scenario.vars_schema(), &vars)
                .into_iter()
                .map(|e| format!("vars {e}")),
        );

        if !process.result.is_null() {
            errors.extend(
                self.validation
                    .validate(&scenario.result, &process.result)
                    .into_iter()
                    .map(|e| format!("result {e}")),
            );
        }
        errors
    }

    /// Append `event`, write the log entry and enter the target state.
    #[allow(clippy::too_many_arguments)]
    fn advance(
        &self,
        next: &mut Process,
        event: Event,
        mut ctx: Value,
        goto: Option<&str>,
        log: &TransitionLog,
        actor: Option<&ActorRef>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if truthy(&log.condition, &ctx)? {
            next.log.push(LogEntry {
                timestamp: event.timestamp(),
                title: text(evaluator::apply_fn(&log.title, &ctx)?),
                description: text(evaluator::apply_fn(&log.description, &ctx)?),
                actor: actor.cloned(),
            });
        }

        if let Value::Array(events) = &mut ctx["events"] {
            events.push(serde_json::to_value(&event)?);
        }
        next.events.push(event);

        let target = goto.unwrap_or(next.current.key.as_str()).to_owned();
        next.current = instantiate_state(&next.scenario, &target, &ctx, timestamp)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // timeout
    // -----------------------------------------------------------------------

    /// Take the first due timeout transition of the current state.
    ///
    /// Returns an unchanged copy (and appends no event) if none is due.
    #[instrument(skip(self, process), fields(process_id = %process.id, state = %process.current.key))]
    pub fn timeout(
        &self,
        process: &Process,
        now: Option<DateTime<Utc>>,
    ) -> Result<Process, EngineError> {
        let now = now.unwrap_or_else(Utc::now);
        match self.try_timeout(process, now)? {
            Some(next) => {
                info!("timeout moved process to '{}'", next.current.key);
                Ok(next)
            }
            None => {
                debug!("no timeout transition is due");
                Ok(process.clone())
            }
        }
    }

    pub(crate) fn try_timeout(
        &self,
        process: &Process,
        now: DateTime<Utc>,
    ) -> Result<Option<Process>, EngineError> {
        let key = process.current.key.as_str();
        let state = process
            .scenario
            .states
            .get(key)
            .ok_or_else(|| EngineError::MissingState(key.to_owned()))?;

        let elapsed = (now - process.current.timestamp).num_seconds();
        let ctx = eval_context(process, serde_json::to_value(&process.current)?)?;

        for transition in state.transitions.iter().filter_map(|t| t.as_timeout()) {
            let due = u64::try_from(elapsed).is_ok_and(|elapsed| elapsed >= transition.after);
            if !due || !truthy(&transition.condition, &ctx)? {
                continue;
            }

            let event = Event::from(TimeoutEvent {
                previous: tail(process),
                timestamp: now,
                hash: String::new(),
            })
            .seal()?;

            let mut next = process.clone();
            self.advance(
                &mut next,
                event,
                ctx,
                transition.goto.as_deref(),
                &transition.log,
                None,
                now,
            )?;
            return Ok(Some(next));
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tail(process: &Process) -> String {
    process.tail_hash().unwrap_or_default().to_owned()
}

fn object_map(value: &Value) -> Option<BTreeMap<String, Value>> {
    value
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Whether an actor may perform an action with the given actor list.
///
/// Entries match by key, `*`-template or role. While predicting, a
/// `service:` entry matches any actor.
fn is_authorized(allowed: &[String], key: &str, instance: &Value, predicting: bool) -> bool {
    let roles: Vec<&str> = match instance.get("role") {
        Some(Value::String(role)) => vec![role.as_str()],
        Some(Value::Array(roles)) => roles.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    allowed.iter().any(|entry| {
        matches_actor(entry, key)
            || roles.contains(&entry.as_str())
            || (predicting && service_name(entry).is_some())
    })
}

/// Actor instances for a new process.
///
/// Declared actors start from their schema title and property defaults.
/// `*`-templates are only instantiated for override keys that map to them.
fn resolve_actors(
    scenario: &NormalizedScenario,
    overrides: &BTreeMap<String, Value>,
    errors: &mut Vec<String>,
) -> BTreeMap<String, Value> {
    let mut actors = BTreeMap::new();

    for (key, schema) in &scenario.actors {
        if key.ends_with('*') {
            continue;
        }
        actors.insert(key.clone(), actor_base(key, schema));
    }

    for (key, properties) in overrides {
        if !actors.contains_key(key) {
            let template = template_name(key).and_then(|t| scenario.actors.get(&t));
            match template {
                Some(schema) => {
                    actors.insert(key.clone(), actor_base(key, schema));
                }
                None => {
                    errors.push(format!("unknown actor '{key}'"));
                    continue;
                }
            }
        }
        match (actors.get_mut(key), properties) {
            (Some(Value::Object(base)), Value::Object(props)) => {
                base.extend(props.clone());
            }
            (_, Value::Null) => {}
            _ => errors.push(format!("actor '{key}' must be an object")),
        }
    }
    actors
}

fn actor_base(key: &str, schema: &Value) -> Value {
    let mut base = Map::new();
    let title = schema
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(key)
        .to_owned();
    base.insert("title".into(), Value::String(title));
    if let Some(Value::Object(properties)) = schema.get("properties") {
        for (name, property) in properties {
            if let Some(default) = schema_default(property) {
                base.insert(name.clone(), default.clone());
            }
        }
    }
    Value::Object(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_actors_bind_from_overrides_only() {
        let scenario = scenario::normalize(&json!({
            "actors": {
                "client": { "title": "Client", "properties": { "tier": { "type": "string", "default": "basic" } } },
                "signer_*": null
            },
            "states": { "initial": { "on": "complete", "goto": "(done)" } }
        }))
        .unwrap();

        let mut errors = Vec::new();
        let overrides = BTreeMap::from([
            ("signer_1".to_owned(), json!({ "id": "s1" })),
            ("nobody".to_owned(), json!({})),
        ]);
        let actors = resolve_actors(&scenario, &overrides, &mut errors);

        assert_eq!(actors["client"], json!({ "title": "Client", "tier": "basic" }));
        assert_eq!(actors["signer_1"], json!({ "title": "signer_1", "id": "s1" }));
        assert!(!actors.contains_key("signer_*"));
        assert_eq!(errors, vec!["unknown actor 'nobody'"]);
    }

    #[test]
    fn authorization_by_key_template_and_role() {
        let allowed = vec!["client".to_owned(), "signer_*".to_owned(), "admin".to_owned()];
        assert!(is_authorized(&allowed, "client", &json!({}), false));
        assert!(is_authorized(&allowed, "signer_2", &json!({}), false));
        assert!(is_authorized(&allowed, "other", &json!({ "role": ["admin"] }), false));
        assert!(!is_authorized(&allowed, "other", &json!({ "role": "user" }), false));

        let service = vec!["service:email".to_owned()];
        assert!(!is_authorized(&service, "client", &json!({}), false));
        assert!(is_authorized(&service, "client", &json!({}), true));
        assert!(is_authorized(&service, "service:email", &json!({}), false));
    }
}
