use anyhow::{Context, Result};
use clap::ArgMatches;
use tandem_core::{
    models::{Decision, DecisionStatus},
    AgentSelector, Coordinator, DecisionQuery, Error,
};

use super::{emit, parse_opt, parse_required, resolve_agent, resolve_project, string, strings};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("add", sub_m)) => add(coordinator, sub_m),
        Some(("show", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            emit(&coordinator.get_decision(&project, id(sub_m)?)?)
        }
        Some(("list", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            let status = parse_opt::<DecisionStatus>(sub_m, "status")?;
            emit(&coordinator.get_decisions(&project, status)?)
        }
        Some(("search", sub_m)) => search(coordinator, sub_m),
        Some(("status", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            let status: DecisionStatus = parse_required(sub_m, "status")?;
            let updated = coordinator.update_decision_status(
                &project,
                id(sub_m)?,
                status,
                sub_m.get_one::<String>("superseded-by").map(String::as_str),
            )?;
            emit(&updated)
        }
        Some(("reindex", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            let index = coordinator.rebuild_decision_index(&project)?;
            emit(&serde_json::json!({
                "project": project,
                "decisions": index.indexed.len(),
                "words": index.by_word.len(),
            }))
        }
        _ => anyhow::bail!("Unknown decision subcommand. Run 'tandem decision --help' for usage."),
    }
}

fn add(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    let author = resolve_agent(coordinator, matches)?;
    let project = resolve_project(coordinator, matches)?;
    let title = matches
        .get_one::<String>("title")
        .context("Title is required")?;

    let mut decision = Decision::new(title.as_str(), author, coordinator.now())
        .with_description(string(matches, "description").unwrap_or_default())
        .with_rationale(string(matches, "rationale").unwrap_or_default())
        .with_tags(strings(matches, "tag"))
        .with_related_files(strings(matches, "file"));
    if let Some(status) = parse_opt::<DecisionStatus>(matches, "status")? {
        decision = decision.with_status(status);
    }
    emit(&coordinator.save_decision(&project, decision)?)
}

fn search(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    let project = resolve_project(coordinator, matches)?;
    let mut query = DecisionQuery::text(string(matches, "text").unwrap_or_default())
        .with_tags(strings(matches, "tag"));
    if let Some(author) = matches.get_one::<String>("author") {
        let id = match coordinator.resolve_agent(&AgentSelector::id(author.as_str())) {
            Err(Error::AgentNotFound(_)) => {
                coordinator.resolve_agent(&AgentSelector::name(author.as_str()))?
            }
            other => other?,
        };
        query = query.with_author(id);
    }
    if let Some(status) = parse_opt::<DecisionStatus>(matches, "status")? {
        query = query.with_status(status);
    }
    if let Some(limit) = matches.get_one::<usize>("limit") {
        query = query.with_limit(*limit);
    }
    emit(&coordinator.search_decisions(&project, &query)?)
}

fn id(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("id")
        .map(String::as_str)
        .context("Decision id is required")
}
