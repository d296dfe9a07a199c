use anyhow::Result;
use clap::ArgMatches;
use serde::Serialize;
use tandem_core::{
    models::{AgentProfile, ContextState, SessionLogEntry},
    Coordinator,
};

use super::{emit, resolve_agent, strings};

#[derive(Serialize)]
struct AgentView {
    profile: AgentProfile,
    context: ContextState,
    sessions: Vec<SessionLogEntry>,
}

pub fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("register", sub_m)) => {
            let name = sub_m
                .get_one::<String>("name")
                .ok_or_else(|| anyhow::anyhow!("Agent name is required"))?;
            let agent_type = sub_m
                .get_one::<String>("type")
                .map_or("generic", String::as_str);
            let registration =
                coordinator.register_agent(name, agent_type, &strings(sub_m, "capability"))?;
            emit(&registration)
        }
        Some(("show", sub_m)) => {
            let id = resolve_agent(coordinator, sub_m)?;
            let agents = coordinator.agents();
            emit(&AgentView {
                profile: agents.get(&id)?,
                context: agents.context_state(&id)?,
                sessions: agents.session_log(&id)?,
            })
        }
        Some(("list", _)) => emit(&coordinator.agents().list()?),
        _ => anyhow::bail!("Unknown agent subcommand. Run 'tandem agent --help' for usage."),
    }
}
