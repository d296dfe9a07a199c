pub mod handlers;

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

const PRIORITIES: [&str; 4] = ["low", "normal", "high", "critical"];
const OUTCOMES: [&str; 4] = ["completed", "partial", "abandoned", "failed"];
const DECISION_STATUSES: [&str; 5] = ["proposed", "accepted", "superseded", "deprecated", "archived"];
const NEW_DECISION_STATUSES: [&str; 3] = ["proposed", "accepted", "deprecated"];
const CHANGE_TYPES: [&str; 5] = ["created", "modified", "deleted", "renamed", "refactored"];
const IMPACT_LEVELS: [&str; 4] = ["low", "medium", "high", "critical"];
const FILE_TYPES: [&str; 5] = ["source", "test", "config", "documentation", "other"];

pub fn build_cli() -> Command {
    Command::new("tandem")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Coordinate agents sharing a workspace: locks, contexts and project memory")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Data directory (overrides TANDEM_ROOT and config files)"),
        )
        .subcommand(cmd_project())
        .subcommand(cmd_agent())
        .subcommand(cmd_context())
        .subcommand(cmd_lock())
        .subcommand(cmd_decision())
        .subcommand(cmd_change())
        .subcommand(cmd_file())
        .subcommand(cmd_activity())
}

/// `--project` / `--path` pair shared by every project-scoped command
fn project_args() -> [Arg; 2] {
    [
        Arg::new("project")
            .long("project")
            .short('p')
            .help("Project id or name"),
        Arg::new("path")
            .long("path")
            .value_parser(value_parser!(PathBuf))
            .conflicts_with("project")
            .help("Workspace path (defaults to the current directory)"),
    ]
}

fn agent_arg() -> Arg {
    Arg::new("agent")
        .long("agent")
        .short('a')
        .help("Agent id or name (defaults to TANDEM_AGENT)")
}

fn choice(name: &'static str, long: &'static str, values: [&'static str; 4]) -> Arg {
    Arg::new(name).long(long).value_parser(values)
}

fn files_arg(help: &'static str) -> Arg {
    Arg::new("files")
        .required(true)
        .num_args(1..)
        .help(help)
}

fn cmd_project() -> Command {
    Command::new("project")
        .about("Manage projects")
        .subcommand_required(true)
        .subcommand(
            Command::new("init")
                .about("Register a workspace, or show the project already registered for it")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_parser(value_parser!(PathBuf))
                        .help("Workspace path (defaults to the current directory)"),
                )
                .arg(Arg::new("name").long("name").help("Project name (defaults to the directory name)"))
                .arg(Arg::new("description").long("description").short('d')),
        )
        .subcommand(Command::new("show").about("Show a project").args(project_args()))
        .subcommand(Command::new("list").about("List projects"))
}

fn cmd_agent() -> Command {
    Command::new("agent")
        .about("Manage agents")
        .subcommand_required(true)
        .subcommand(
            Command::new("register")
                .about("Register an agent, or reconnect one with the same name")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("type").long("type").short('t').default_value("generic"))
                .arg(
                    Arg::new("capability")
                        .long("capability")
                        .short('c')
                        .action(ArgAction::Append)
                        .help("Repeat for several capabilities"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show an agent's profile, context and session log")
                .arg(agent_arg()),
        )
        .subcommand(Command::new("list").about("List agents"))
}

fn cmd_context() -> Command {
    let objective = || {
        [
            Arg::new("objective").required(true),
            choice("priority", "priority", PRIORITIES).default_value("normal"),
        ]
    };
    Command::new("context")
        .about("Manage what an agent is working on")
        .subcommand_required(true)
        .subcommand(
            Command::new("start")
                .about("Set the agent's current context")
                .args(objective())
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("switch")
                .about("Archive the current context and start another")
                .args(objective())
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("end")
                .about("Close the current context and record the session")
                .arg(Arg::new("summary").required(true))
                .arg(choice("outcome", "outcome", OUTCOMES).default_value("completed"))
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show the current context and history")
                .arg(agent_arg()),
        )
}

fn cmd_lock() -> Command {
    Command::new("lock")
        .about("Manage file locks")
        .subcommand_required(true)
        .subcommand(
            Command::new("acquire")
                .about("Lock files, all or nothing")
                .arg(files_arg("Files to lock, relative to the workspace"))
                .arg(Arg::new("reason").long("reason").short('r').required(true))
                .arg(
                    Arg::new("minutes")
                        .long("minutes")
                        .short('m')
                        .value_parser(value_parser!(i64))
                        .help("Lock duration (defaults to the configured duration)"),
                )
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("release")
                .about("Release locks held by the agent")
                .arg(files_arg("Files to release"))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .requires("reason")
                        .help("Release regardless of owner"),
                )
                .arg(Arg::new("reason").long("reason").short('r'))
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List active locks")
                .arg(Arg::new("file").long("file").short('f').help("Show only this file"))
                .args(project_args()),
        )
        .subcommand(
            Command::new("sweep")
                .about("Reclaim expired locks in every project")
                .arg(
                    Arg::new("watch")
                        .long("watch")
                        .action(ArgAction::SetTrue)
                        .help("Keep sweeping at the configured interval until Ctrl-C"),
                ),
        )
}

fn cmd_decision() -> Command {
    Command::new("decision")
        .about("Record and search design decisions")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Record a decision")
                .arg(Arg::new("title").required(true))
                .arg(Arg::new("description").long("description").short('d'))
                .arg(Arg::new("rationale").long("rationale"))
                .arg(Arg::new("tag").long("tag").short('t').action(ArgAction::Append))
                .arg(Arg::new("file").long("file").short('f').action(ArgAction::Append))
                .arg(Arg::new("status").long("status").value_parser(NEW_DECISION_STATUSES))
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show one decision")
                .arg(Arg::new("id").required(true))
                .args(project_args()),
        )
        .subcommand(
            Command::new("list")
                .about("List decisions, newest first")
                .arg(Arg::new("status").long("status").value_parser(DECISION_STATUSES))
                .args(project_args()),
        )
        .subcommand(
            Command::new("search")
                .about("Search decisions by text, tags, author and status")
                .arg(Arg::new("text").help("Free text; omit to match every decision"))
                .arg(Arg::new("tag").long("tag").short('t').action(ArgAction::Append))
                .arg(Arg::new("author").long("author").help("Author id or name"))
                .arg(Arg::new("status").long("status").value_parser(DECISION_STATUSES))
                .arg(Arg::new("limit").long("limit").short('n').value_parser(value_parser!(usize)))
                .args(project_args()),
        )
        .subcommand(
            Command::new("status")
                .about("Move a decision to a new status")
                .arg(Arg::new("id").required(true))
                .arg(Arg::new("status").required(true).value_parser(DECISION_STATUSES))
                .arg(Arg::new("superseded-by").long("superseded-by"))
                .args(project_args()),
        )
        .subcommand(
            Command::new("reindex")
                .about("Rebuild the decision search index from stored decisions")
                .args(project_args()),
        )
}

fn cmd_change() -> Command {
    Command::new("change")
        .about("Record and list file changes")
        .subcommand_required(true)
        .subcommand(
            Command::new("log")
                .about("Record a change")
                .arg(Arg::new("file").required(true))
                .arg(Arg::new("type").long("type").short('t').required(true).value_parser(CHANGE_TYPES))
                .arg(Arg::new("description").long("description").short('d'))
                .arg(choice("impact", "impact", IMPACT_LEVELS).default_value("medium"))
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("recent")
                .about("List recent changes, newest first")
                .arg(choice("impact", "impact", IMPACT_LEVELS))
                .arg(Arg::new("file").long("file").short('f'))
                .arg(Arg::new("limit").long("limit").short('n').value_parser(value_parser!(usize)))
                .args(project_args()),
        )
}

fn cmd_file() -> Command {
    Command::new("file")
        .about("Track file metadata and dependencies")
        .subcommand_required(true)
        .subcommand(
            Command::new("update")
                .about("Update a file's metadata")
                .arg(Arg::new("file").required(true))
                .arg(Arg::new("type").long("type").short('t').value_parser(FILE_TYPES))
                .arg(Arg::new("module").long("module"))
                .arg(
                    Arg::new("depends-on")
                        .long("depends-on")
                        .action(ArgAction::Append)
                        .help("Replaces the dependency list; repeat for several"),
                )
                .arg(
                    Arg::new("no-dependencies")
                        .long("no-dependencies")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("depends-on"),
                )
                .arg(Arg::new("complexity").long("complexity").value_parser(value_parser!(u32)))
                .args(project_args())
                .arg(agent_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show one file's metadata, or every file's")
                .arg(Arg::new("file"))
                .args(project_args()),
        )
}

fn cmd_activity() -> Command {
    Command::new("activity")
        .about("Show recent coordination events")
        .arg(
            Arg::new("limit")
                .long("limit")
                .short('n')
                .value_parser(value_parser!(usize))
                .default_value("20"),
        )
        .args(project_args())
}
