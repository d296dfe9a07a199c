use anyhow::Result;
use clap::ArgMatches;
use tandem_core::Coordinator;

use super::{emit, resolve_project};

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    let project = resolve_project(coordinator, matches)?;
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(20);
    emit(&coordinator.recent_activity(&project, limit)?)
}
