use anyhow::{Context, Result};
use clap::ArgMatches;
use tandem_core::{
    models::{Change, ChangeType, ImpactLevel},
    ChangeQuery, Coordinator,
};

use super::{emit, parse_opt, parse_required, resolve_agent, resolve_project, string};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("log", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let project = resolve_project(coordinator, sub_m)?;
            let file = sub_m.get_one::<String>("file").context("File is required")?;
            let change_type: ChangeType = parse_required(sub_m, "type")?;
            let impact: ImpactLevel = parse_required(sub_m, "impact")?;

            let change = Change::new(file.as_str(), change_type, agent, coordinator.now())
                .with_description(string(sub_m, "description").unwrap_or_default())
                .with_impact(impact);
            emit(&coordinator.log_change(&project, change)?)
        }
        Some(("recent", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            let query = ChangeQuery {
                impact: parse_opt(sub_m, "impact")?,
                file: string(sub_m, "file"),
                limit: sub_m.get_one::<usize>("limit").copied(),
            };
            emit(&coordinator.get_recent_changes(&project, &query)?)
        }
        _ => anyhow::bail!("Unknown change subcommand. Run 'tandem change --help' for usage."),
    }
}
