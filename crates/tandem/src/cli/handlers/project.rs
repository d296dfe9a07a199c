use anyhow::Result;
use clap::ArgMatches;
use tandem_core::Coordinator;

use super::{emit, resolve_project, workspace_path};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", sub_m)) => {
            let path = workspace_path(sub_m)?;
            let discovered = coordinator.init_project(
                &path,
                sub_m.get_one::<String>("name").map(String::as_str),
                sub_m.get_one::<String>("description").map(String::as_str),
            )?;
            emit(&discovered)
        }
        Some(("show", sub_m)) => {
            let id = resolve_project(coordinator, sub_m)?;
            emit(&coordinator.projects().get(&id)?)
        }
        Some(("list", _)) => emit(&coordinator.projects().list()?),
        _ => anyhow::bail!("Unknown project subcommand. Run 'tandem project --help' for usage."),
    }
}
