//! Command handlers: resolve arguments, call the coordinator, print JSON

mod activity;
mod agent;
mod change;
mod context;
mod decision;
mod file;
mod lock;
mod project;

use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::Serialize;
use tandem_core::{
    load_config,
    models::{AgentId, ProjectId},
    AgentSelector, Coordinator, Error, ProjectSelector,
};

const AGENT_ENV: &str = "TANDEM_AGENT";

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let coordinator = open_coordinator(matches)?;
    match matches.subcommand() {
        Some(("project", sub_m)) => project::handle(&coordinator, sub_m),
        Some(("agent", sub_m)) => agent::handle(&coordinator, sub_m),
        Some(("context", sub_m)) => context::handle(&coordinator, sub_m),
        Some(("lock", sub_m)) => lock::handle(&coordinator, sub_m).await,
        Some(("decision", sub_m)) => decision::handle(&coordinator, sub_m),
        Some(("change", sub_m)) => change::handle(&coordinator, sub_m),
        Some(("file", sub_m)) => file::handle(&coordinator, sub_m),
        Some(("activity", sub_m)) => activity::handle(&coordinator, sub_m),
        _ => anyhow::bail!("Unknown command. Run 'tandem --help' for usage."),
    }
}

fn open_coordinator(matches: &ArgMatches) -> Result<Coordinator> {
    let mut config = load_config().context("Failed to load configuration")?;
    if let Some(root) = matches.get_one::<PathBuf>("root") {
        config.root.clone_from(root);
    }
    Ok(Coordinator::open(&config)?)
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn emit<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// `--path`, else the current directory, made absolute.
pub(crate) fn workspace_path(matches: &ArgMatches) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    Ok(matches
        .get_one::<PathBuf>("path")
        .map_or_else(|| cwd.clone(), |p| cwd.join(p)))
}

/// Resolve `--project` (id, then name) or the workspace path.
pub(crate) fn resolve_project(coordinator: &Coordinator, matches: &ArgMatches) -> Result<ProjectId> {
    if let Some(value) = matches.get_one::<String>("project") {
        return match coordinator.resolve_project(&ProjectSelector::id(value.as_str())) {
            Err(Error::ProjectNotFound(_)) => {
                Ok(coordinator.resolve_project(&ProjectSelector::name(value.as_str()))?)
            }
            other => Ok(other?),
        };
    }
    let path = workspace_path(matches)?;
    Ok(coordinator.resolve_project(&ProjectSelector::path(path))?)
}

/// Resolve `--agent` or `TANDEM_AGENT`, trying it as an id and then as a name.
pub(crate) fn resolve_agent(coordinator: &Coordinator, matches: &ArgMatches) -> Result<AgentId> {
    let value = matches
        .get_one::<String>("agent")
        .cloned()
        .or_else(|| std::env::var(AGENT_ENV).ok())
        .ok_or_else(|| {
            anyhow::anyhow!("No agent given. Set {AGENT_ENV} or use --agent")
        })?;
    match coordinator.resolve_agent(&AgentSelector::id(value.as_str())) {
        Err(Error::AgentNotFound(_)) => Ok(coordinator.resolve_agent(&AgentSelector::name(value))?),
        other => Ok(other?),
    }
}

/// Parse an optional argument through its `FromStr` impl.
pub(crate) fn parse_opt<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("Invalid --{name} '{raw}': {e}"))
        })
        .transpose()
}

/// Parse an argument that has a default value.
pub(crate) fn parse_required<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_opt(matches, name)?.ok_or_else(|| anyhow::anyhow!("Missing --{name}"))
}

pub(crate) fn strings(matches: &ArgMatches, name: &str) -> Vec<String> {
    matches
        .get_many::<String>(name)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn string(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).cloned()
}
