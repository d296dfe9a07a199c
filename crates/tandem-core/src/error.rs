//! Error types for tandem-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single file that could not be locked because another agent holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConflict {
    /// File path inside the project
    pub file: String,
    /// Agent currently holding the lock
    pub owner: String,
    /// Reason the owner gave when acquiring
    pub reason: String,
    /// When the owner's lock expires
    pub expires_at: DateTime<Utc>,
}

/// Core error type for tandem operations
#[derive(Debug, Error)]
pub enum Error {
    /// No project matches the given identifier
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// No agent matches the given identifier
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// No decision with this id exists in the project
    #[error("Decision not found: {0}")]
    DecisionNotFound(String),

    /// One or more requested files are held by other agents
    #[error("{} file(s) locked by other agents: {}", conflicts.len(), describe_conflicts(conflicts))]
    LockConflict {
        /// Every conflicting file in the batch
        conflicts: Vec<LockConflict>,
    },

    /// An agent tried to release locks it does not own
    #[error("Agent '{agent_id}' does not own the lock on: {}", files.join(", "))]
    LockAuthorization {
        /// The agent attempting the release
        agent_id: String,
        /// Files owned by someone else
        files: Vec<String>,
    },

    /// A persisted record could not be parsed
    #[error("Corrupted record '{key}': {reason}")]
    DataCorruption {
        /// Store key of the corrupted record
        key: String,
        /// Parser message
        reason: String,
    },

    /// A conditional write found the record changed underneath it
    #[error("Record '{key}' was modified concurrently")]
    WriteConflict {
        /// Store key that changed
        key: String,
    },

    /// An advisory guard could not be acquired in time
    #[error("Timed out waiting for '{resource}'")]
    Contention {
        /// Guard scope that stayed busy
        resource: String,
    },

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Root directory or configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(String),
}

fn describe_conflicts(conflicts: &[LockConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} (held by {})", c.file, c.owner))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an I/O error with context.
    pub fn io(context: impl std::fmt::Display, err: &std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }

    /// Returns the process exit code for this error category.
    ///
    /// - 1: caller error (validation, configuration)
    /// - 2: system error (I/O, guard contention)
    /// - 3: not found
    /// - 4: state error (conflicts, authorization, corruption)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Configuration(_) => 1,
            Self::Io(_) | Self::Contention { .. } => 2,
            Self::ProjectNotFound(_) | Self::AgentNotFound(_) | Self::DecisionNotFound(_) => 3,
            Self::LockConflict { .. }
            | Self::LockAuthorization { .. }
            | Self::DataCorruption { .. }
            | Self::WriteConflict { .. } => 4,
        }
    }

    /// Returns the per-file conflicts if this is a lock conflict.
    pub fn conflicts(&self) -> Option<&[LockConflict]> {
        match self {
            Self::LockConflict { conflicts } => Some(conflicts),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for tandem-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_conflict_display_lists_owners() {
        let err = Error::LockConflict {
            conflicts: vec![LockConflict {
                file: "src/x.py".to_string(),
                owner: "A1".to_string(),
                reason: "refactor".to_string(),
                expires_at: Utc::now(),
            }],
        };
        let display = err.to_string();
        assert!(display.contains("1 file(s)"));
        assert!(display.contains("src/x.py (held by A1)"));
    }

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::validation("x").exit_code(), 1);
        assert_eq!(Error::configuration("x").exit_code(), 1);
        assert_eq!(Error::Io("x".into()).exit_code(), 2);
        assert_eq!(Error::ProjectNotFound("p".into()).exit_code(), 3);
        assert_eq!(Error::AgentNotFound("a".into()).exit_code(), 3);
        assert_eq!(
            Error::DataCorruption {
                key: "k".into(),
                reason: "r".into()
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_conflicts_accessor() {
        assert!(Error::validation("x").conflicts().is_none());
        let err = Error::LockConflict { conflicts: vec![] };
        assert_eq!(err.conflicts().map(<[LockConflict]>::len), Some(0));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(Error::from(io), Error::Io(_)));
    }
}
