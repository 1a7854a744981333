//! `procession` CLI entry-point.
//!
//! Available sub-commands:
//! - `normalize`   — print the canonical form of a scenario.
//! - `id`          — print the deterministic id of a scenario.
//! - `instantiate` — start a process.
//! - `step`        — perform an action on a process.
//! - `timeout`     — fire a due timeout transition.
//! - `predict`     — list the states a process is expected to pass through.
//! - `replay`      — rebuild a process from its event log.
//! - `migrate`     — rebase an event log onto another scenario version.
//!
//! Scenarios, processes and event logs are JSON files. Results go to stdout
//! as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{ActorRef, EngineConfig, Event, Process, ProcessEngine, StartInstructions};
use scenario::NormalizedScenario;
use schema::{DirectoryFetcher, JsonSchemaValidator, NoFetch, SchemaFetcher, ValidationContext};

#[derive(Parser)]
#[command(
    name = "procession",
    about = "Deterministic runtime for declarative multi-actor workflows",
    version
)]
struct Cli {
    /// Directory holding JSON schemas referenced by absolute `$ref` URIs.
    #[arg(long, global = true, env = "PROCESSION_SCHEMAS")]
    schemas: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the normalized form of a scenario.
    Normalize {
        /// Path to the scenario JSON file.
        scenario: PathBuf,
    },
    /// Print the deterministic id of a scenario.
    Id {
        scenario: PathBuf,
    },
    /// Start a process and print it.
    Instantiate {
        scenario: PathBuf,
        /// JSON file with start instructions (`id`, `timestamp`, `actors`, `vars`).
        #[arg(long)]
        start: Option<PathBuf>,
    },
    /// Perform an action and print the resulting process.
    Step {
        /// Path to the process JSON file.
        process: PathBuf,
        action: String,
        actor: String,
        /// Id of the party acting as `actor`.
        #[arg(long)]
        id: Option<String>,
        /// Response as inline JSON.
        #[arg(long)]
        response: Option<String>,
    },
    /// Fire a due timeout transition and print the resulting process.
    Timeout {
        process: PathBuf,
        /// Evaluation time (RFC 3339); defaults to now.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Print the predicted states of a process.
    Predict {
        process: PathBuf,
        #[arg(long, env = "PROCESSION_PREDICT_MAX", default_value_t = 100)]
        max: usize,
    },
    /// Rebuild a process from a scenario and an event log.
    Replay {
        scenario: PathBuf,
        events: PathBuf,
    },
    /// Rebase an event log onto a scenario and print the resulting process.
    Migrate {
        scenario: PathBuf,
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fetcher: Box<dyn SchemaFetcher> = match &cli.schemas {
        Some(dir) => Box::new(DirectoryFetcher::new(dir)),
        None => Box::new(NoFetch),
    };

    match cli.command {
        Command::Normalize { scenario } => {
            print(&load_scenario(&scenario)?)?;
        }
        Command::Id { scenario } => {
            let id = scenario::scenario_id(&load_scenario(&scenario)?)?;
            println!("{id}");
        }
        Command::Instantiate { scenario, start } => {
            let scenario = load_scenario(&scenario)?;
            let start: StartInstructions = match start {
                Some(path) => read_json(&path)?,
                None => StartInstructions::default(),
            };
            let engine = build_engine(&scenario, fetcher.as_ref(), EngineConfig::default()).await?;
            print(&engine.instantiate(&scenario, start)?)?;
        }
        Command::Step { process, action, actor, id, response } => {
            let process: Process = read_json(&process)?;
            let response = response
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .context("--response is not valid JSON")?;
            let actor = ActorRef { key: actor, id };
            let engine = build_engine(&process.scenario, fetcher.as_ref(), EngineConfig::default()).await?;
            let next = engine.step(&process, &action, actor, response)?;
            if let Some(Event::Action(event)) = next.events.last() {
                if event.skipped {
                    info!("action '{}' was skipped: {}", action, event.errors.join("; "));
                }
            }
            print(&next)?;
        }
        Command::Timeout { process, now } => {
            let process: Process = read_json(&process)?;
            let engine = build_engine(&process.scenario, fetcher.as_ref(), EngineConfig::default()).await?;
            print(&engine.timeout(&process, now)?)?;
        }
        Command::Predict { process, max } => {
            let process: Process = read_json(&process)?;
            let config = EngineConfig { predict_max: max };
            let engine = build_engine(&process.scenario, fetcher.as_ref(), config).await?;
            print(&engine.predict(&process)?)?;
        }
        Command::Replay { scenario, events } => {
            let scenario = load_scenario(&scenario)?;
            let events: Vec<Event> = read_json(&events)?;
            let engine = build_engine(&scenario, fetcher.as_ref(), EngineConfig::default()).await?;
            print(&engine.replay(&scenario, &events)?)?;
        }
        Command::Migrate { scenario, events } => {
            let scenario = load_scenario(&scenario)?;
            let events: Vec<Event> = read_json(&events)?;
            if events.is_empty() {
                bail!("the event log is empty");
            }
            let engine = build_engine(&scenario, fetcher.as_ref(), EngineConfig::default()).await?;
            print(&engine.migrate(&scenario, &events)?)?;
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn load_scenario(path: &Path) -> Result<NormalizedScenario> {
    let authored: Value = read_json(path)?;
    scenario::normalize(&authored)
        .with_context(|| format!("cannot normalize scenario {}", path.display()))
}

/// Compile the validation context for a scenario and wrap it in an engine.
async fn build_engine(
    scenario: &NormalizedScenario,
    fetcher: &dyn SchemaFetcher,
    config: EngineConfig,
) -> Result<ProcessEngine> {
    let root = serde_json::to_value(scenario)?;
    let validation = ValidationContext::compile(root, fetcher, Arc::new(JsonSchemaValidator::default())).await;
    Ok(ProcessEngine::new(Arc::new(validation), config))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
