//! Replay and migration of event logs.
//!
//! Replay rebuilds a process by feeding stored events back through the same
//! decision logic `step` and `timeout` use. Every event must carry a correct
//! hash and link to the event before it.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use scenario::{scenario_id, NormalizedScenario};

use crate::event::Event;
use crate::executor::Outcome;
use crate::models::Process;
use crate::{EngineError, ProcessEngine};

impl ProcessEngine {
    /// Rebuild a process from its full event log.
    ///
    /// # Errors
    /// - `MissingGenesis` if the log does not start with an instantiate event.
    /// - `ScenarioMismatch` if the log belongs to another scenario version.
    /// - `HashMismatch` / `BrokenChain` for a tampered or reordered log.
    /// - `LogIntegrity` if an event recorded as successful would be rejected.
    #[instrument(skip(self, scenario, events), fields(event_count = events.len()))]
    pub fn replay(
        &self,
        scenario: &NormalizedScenario,
        events: &[Event],
    ) -> Result<Process, EngineError> {
        let Some((first, rest)) = events.split_first() else {
            return Err(EngineError::MissingGenesis);
        };
        let Event::Instantiate(genesis) = first else {
            return Err(EngineError::MissingGenesis);
        };
        verify_hash(0, first)?;

        let expected = scenario_id(scenario)?;
        if genesis.scenario != expected {
            return Err(EngineError::ScenarioMismatch {
                expected,
                found: genesis.scenario,
            });
        }

        let mut process = self.genesis(scenario, first)?;
        for (offset, event) in rest.iter().enumerate() {
            process = self.apply_event(&process, offset + 1, event)?;
        }
        info!("replayed {} event(s) into state '{}'", events.len(), process.current.key);
        Ok(process)
    }

    /// Apply events to an existing process.
    ///
    /// A leading run of events already present in the process is skipped, so
    /// the full log or only its new tail may be passed.
    ///
    /// # Errors
    /// As [`replay`](Self::replay); `GenesisOnExisting` for an instantiate
    /// event among the new events.
    #[instrument(skip(self, process, events), fields(process_id = %process.id, event_count = events.len()))]
    pub fn replay_onto(&self, process: &Process, events: &[Event]) -> Result<Process, EngineError> {
        let known: HashSet<&str> = process.events.iter().map(Event::hash).collect();
        let skip = events
            .iter()
            .take_while(|event| known.contains(event.hash()))
            .count();

        let mut next = process.clone();
        for event in &events[skip..] {
            let index = next.events.len();
            next = self.apply_event(&next, index, event)?;
        }
        Ok(next)
    }

    /// Rebase an event log onto `scenario` and replay it.
    ///
    /// The genesis event is pointed at the new scenario id and every hash and
    /// `previous` link is recomputed in order.
    ///
    /// # Errors
    /// As [`replay`](Self::replay), most commonly `LogIntegrity` when an
    /// action no longer exists or is no longer allowed.
    #[instrument(skip(self, scenario, events), fields(event_count = events.len()))]
    pub fn migrate(
        &self,
        scenario: &NormalizedScenario,
        events: &[Event],
    ) -> Result<Process, EngineError> {
        let id = scenario_id(scenario)?;
        let mut rebased: Vec<Event> = Vec::with_capacity(events.len());

        for event in events {
            let mut event = event.clone();
            if let Event::Instantiate(genesis) = &mut event {
                genesis.scenario = id;
            }
            if let Some(previous) = rebased.last() {
                event.set_previous(previous.hash());
            }
            rebased.push(event.seal()?);
        }

        info!("migrating {} event(s) to scenario {}", rebased.len(), id);
        self.replay(scenario, &rebased)
    }

    fn apply_event(
        &self,
        process: &Process,
        index: usize,
        event: &Event,
    ) -> Result<Process, EngineError> {
        verify_hash(index, event)?;
        if let Event::Instantiate(_) = event {
            return Err(EngineError::GenesisOnExisting { index });
        }
        if event.previous() != process.tail_hash() {
            return Err(EngineError::BrokenChain { index });
        }

        match event {
            Event::Instantiate(_) => Err(EngineError::GenesisOnExisting { index }),
            Event::Action(action) if action.skipped => {
                let mut next = process.clone();
                next.events.push(event.clone());
                Ok(next)
            }

            Event::Action(action) => match self.try_step(
                process,
                &action.action,
                &action.actor,
                action.response.clone(),
                action.timestamp,
                false,
            )? {
                Outcome::Accepted(next) => Ok(*next),
                Outcome::Rejected(reasons) => {
                    warn!("event {} recorded as successful but is rejected: {:?}", index, reasons);
                    Err(EngineError::LogIntegrity { index, reasons })
                }
            },

            Event::Timeout(timeout) => match self.try_timeout(process, timeout.timestamp)? {
                Some(next) => Ok(next),
                None => Err(EngineError::LogIntegrity {
                    index,
                    reasons: vec![format!(
                        "no timeout transition of state '{}' is due",
                        process.current.key
                    )],
                }),
            },
        }
    }
}

fn verify_hash(index: usize, event: &Event) -> Result<(), EngineError> {
    let computed = event.compute_hash()?;
    if computed != event.hash() {
        return Err(EngineError::HashMismatch {
            index,
            stored: event.hash().to_owned(),
            computed,
        });
    }
    Ok(())
}
