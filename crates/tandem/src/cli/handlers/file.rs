use anyhow::{Context, Result};
use clap::ArgMatches;
use tandem_core::{Coordinator, FileMetadataUpdate};

use super::{emit, parse_opt, resolve_agent, resolve_project, string, strings};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("update", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            let path = sub_m.get_one::<String>("file").context("File is required")?;

            let mut update = FileMetadataUpdate::new(path.as_str());
            update.file_type = parse_opt(sub_m, "type")?;
            update.module = string(sub_m, "module");
            update.complexity = sub_m.get_one::<u32>("complexity").copied();
            if sub_m.get_flag("no-dependencies") {
                update.dependencies = Some(Vec::new());
            } else if sub_m.contains_id("depends-on") {
                update = update.with_dependencies(strings(sub_m, "depends-on"));
            }
            // Attribution is optional for metadata edits
            if sub_m.contains_id("agent") || std::env::var_os(super::AGENT_ENV).is_some() {
                update.modified_by = Some(resolve_agent(coordinator, sub_m)?);
            }
            emit(&coordinator.update_file_metadata(&project, update)?)
        }
        Some(("show", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            match sub_m.get_one::<String>("file") {
                Some(path) => emit(&coordinator.get_file_metadata(&project, path)?),
                None => emit(&coordinator.memory().list_file_metadata(&project)?),
            }
        }
        _ => anyhow::bail!("Unknown file subcommand. Run 'tandem file --help' for usage."),
    }
}
