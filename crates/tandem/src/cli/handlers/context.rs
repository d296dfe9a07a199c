use anyhow::{Context, Result};
use clap::ArgMatches;
use tandem_core::{
    models::{Outcome, Priority},
    Coordinator,
};

use super::{emit, parse_required, resolve_agent, resolve_project};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("start", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let project = resolve_project(coordinator, sub_m)?;
            let priority: Priority = parse_required(sub_m, "priority")?;
            let context =
                coordinator.start_context(&agent, &project, objective(sub_m)?, priority)?;
            emit(&context)
        }
        Some(("switch", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let project = resolve_project(coordinator, sub_m)?;
            let priority: Priority = parse_required(sub_m, "priority")?;
            let switched =
                coordinator.switch_context(&agent, &project, objective(sub_m)?, priority)?;
            emit(&switched)
        }
        Some(("end", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let summary = sub_m
                .get_one::<String>("summary")
                .context("Summary is required")?;
            let outcome: Outcome = parse_required(sub_m, "outcome")?;
            emit(&coordinator.end_context(&agent, summary, outcome)?)
        }
        Some(("show", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            emit(&coordinator.agents().context_state(&agent)?)
        }
        _ => anyhow::bail!("Unknown context subcommand. Run 'tandem context --help' for usage."),
    }
}

fn objective(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("objective")
        .map(String::as_str)
        .context("Objective is required")
}
