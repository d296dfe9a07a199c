//! Activity events: the per-project coordination audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{migrate::Versioned, models::AgentId};

/// Event types in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    /// Lock acquired or refreshed
    LockAcquired,
    /// Lock released by its owner
    LockReleased,
    /// Expired lock purged
    LockReclaimed,
    /// Lock removed by an authorized override
    LockOverridden,
    DecisionSaved,
    DecisionStatusChanged,
    ChangeLogged,
}

/// An event in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    /// Agent that caused the event, if any
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub files: Vec<String>,
    /// Human-readable message
    pub message: String,
}

impl ActivityEvent {
    /// Create a new event
    #[must_use]
    pub fn new(kind: ActivityKind, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4().simple()),
            kind,
            timestamp,
            agent_id: None,
            files: Vec::new(),
            message: message.into(),
        }
    }

    /// Attach the agent
    #[must_use]
    pub fn with_agent(mut self, agent_id: &AgentId) -> Self {
        self.agent_id = Some(agent_id.clone());
        self
    }

    /// Attach affected files
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }
}

/// Bounded per-project journal, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityJournal {
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
}

impl ActivityJournal {
    /// Append events, dropping the oldest beyond `limit`.
    pub fn extend(&mut self, events: impl IntoIterator<Item = ActivityEvent>, limit: usize) {
        self.events.extend(events);
        let excess = self.events.len().saturating_sub(limit);
        self.events.drain(..excess);
    }
}

impl Versioned for ActivityJournal {
    const KIND: &'static str = "activity_journal";
}
