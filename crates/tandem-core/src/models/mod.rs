//! Entity models persisted by the coordination engine.
//!
//! Every persisted type implements [`Versioned`](crate::migrate::Versioned)
//! so the store can tag it with a schema version and upgrade older shapes on
//! load.

pub mod activity;
pub mod agent;
pub mod change;
pub mod decision;
pub mod file_meta;
pub mod lock;
pub mod project;

pub use activity::{ActivityEvent, ActivityJournal, ActivityKind};
pub use agent::{
    AgentContext, AgentId, AgentNameIndex, AgentProfile, AgentStatus, ArchivedContext,
    ContextState, EndReason, Outcome, Priority, SessionLog, SessionLogEntry,
};
pub use change::{Change, ChangeLog, ChangeType, ImpactLevel};
pub use decision::{Decision, DecisionStatus};
pub use file_meta::{FileMetadata, FileMetadataTable, FileType};
pub use lock::{LockRecord, LockTable};
pub use project::{ProjectId, ProjectInfo, ProjectPathIndex};

/// Normalise a project-relative file path.
///
/// Backslashes become `/`, leading `./` segments and duplicate separators are
/// dropped. Empty paths, absolute paths and `..` segments are rejected.
pub fn normalize_file_path(raw: &str) -> crate::Result<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.starts_with('/') {
        return Err(crate::Error::validation(format!(
            "File path must be relative to the project: '{raw}'"
        )));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(crate::Error::validation(format!(
                    "File path cannot contain '..': '{raw}'"
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(crate::Error::validation("File path cannot be empty"));
    }
    Ok(segments.join("/"))
}
