//! Agents, their working contexts and session logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

use crate::{
    migrate::{as_object, Migration, Versioned},
    models::ProjectId,
};

/// Unique agent identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("agent-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Agent lifecycle status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    /// Known, no context yet
    #[default]
    Registered,
    /// Working inside a context
    Active,
    /// Last context ended
    Paused,
}

/// A registered agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    /// Reconnect key, unique across agents
    pub name: String,
    pub agent_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub session_count: u32,
    #[serde(default)]
    pub status: AgentStatus,
}

/// v1 stored capabilities as one comma-separated string and had no session count
fn capabilities_to_list(mut payload: Value) -> Result<Value, String> {
    let obj = as_object(&mut payload)?;
    let list: Vec<String> = match obj.get("capabilities") {
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };
    obj.insert("capabilities".into(), json!(list));
    obj.entry("session_count").or_insert(json!(1));
    Ok(payload)
}

const AGENT_PROFILE_MIGRATIONS: &[Migration] = &[Migration {
    from_version: 1,
    description: "capabilities become a list; session_count introduced",
    apply: capabilities_to_list,
}];

impl Versioned for AgentProfile {
    const KIND: &'static str = "agent_profile";
    const SCHEMA_VERSION: u32 = 2;

    fn migrations() -> &'static [Migration] {
        AGENT_PROFILE_MIGRATIONS
    }
}

/// Agent name → id lookup table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentNameIndex {
    #[serde(default)]
    pub by_name: BTreeMap<String, AgentId>,
}

impl Versioned for AgentNameIndex {
    const KIND: &'static str = "agent_name_index";
}

/// Context priority
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// What an agent is currently working on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    pub project_id: ProjectId,
    pub objective: String,
    #[serde(default)]
    pub priority: Priority,
    pub started_at: DateTime<Utc>,
}

/// Why a context left the current slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    Switched,
    Ended,
}

/// A past context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedContext {
    #[serde(flatten)]
    pub context: AgentContext,
    pub ended_at: DateTime<Utc>,
    pub reason: EndReason,
}

/// Current context plus bounded history, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextState {
    #[serde(default)]
    pub current: Option<AgentContext>,
    #[serde(default)]
    pub history: Vec<ArchivedContext>,
}

impl ContextState {
    /// Move the current context (if any) to the front of the history,
    /// keeping at most `limit` archived entries.
    pub fn archive_current(
        &mut self,
        ended_at: DateTime<Utc>,
        reason: EndReason,
        limit: usize,
    ) -> Option<AgentContext> {
        let context = self.current.take()?;
        self.history.insert(
            0,
            ArchivedContext {
                context: context.clone(),
                ended_at,
                reason,
            },
        );
        self.history.truncate(limit);
        Some(context)
    }

    /// The context to restore on reconnect: the current one, else the most
    /// recently archived one.
    #[must_use]
    pub fn last_saved(&self) -> Option<&AgentContext> {
        self.current
            .as_ref()
            .or_else(|| self.history.first().map(|a| &a.context))
    }
}

impl Versioned for ContextState {
    const KIND: &'static str = "context_state";
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Completed,
    Partial,
    Abandoned,
    Failed,
}

/// Closing record written by `end_context`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub project_id: ProjectId,
    pub objective: String,
    pub summary: String,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Per-agent session log, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    #[serde(default)]
    pub entries: Vec<SessionLogEntry>,
}

impl SessionLog {
    /// Append an entry, dropping the oldest beyond `limit`.
    pub fn push(&mut self, entry: SessionLogEntry, limit: usize) {
        self.entries.push(entry);
        let excess = self.entries.len().saturating_sub(limit);
        self.entries.drain(..excess);
    }
}

impl Versioned for SessionLog {
    const KIND: &'static str = "session_log";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::upgrade;

    fn ctx(objective: &str) -> AgentContext {
        AgentContext {
            project_id: ProjectId::new("p1"),
            objective: objective.into(),
            priority: Priority::Normal,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_archive_keeps_newest_first_and_bounds() {
        let mut state = ContextState::default();
        for i in 0..5 {
            state.archive_current(Utc::now(), EndReason::Switched, 3);
            state.current = Some(ctx(&format!("obj-{i}")));
        }
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[0].context.objective, "obj-3");
        assert_eq!(state.history[2].context.objective, "obj-1");
        assert_eq!(state.last_saved().unwrap().objective, "obj-4");

        state.archive_current(Utc::now(), EndReason::Ended, 3);
        assert!(state.current.is_none());
        assert_eq!(state.last_saved().unwrap().objective, "obj-4");
    }

    #[test]
    fn test_archive_without_current_is_noop() {
        let mut state = ContextState::default();
        assert!(state.archive_current(Utc::now(), EndReason::Ended, 10).is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_session_log_drops_oldest() {
        let mut log = SessionLog::default();
        for i in 0..4 {
            log.push(
                SessionLogEntry {
                    project_id: ProjectId::new("p1"),
                    objective: format!("o{i}"),
                    summary: String::new(),
                    outcome: Outcome::Completed,
                    started_at: Utc::now(),
                    ended_at: Utc::now(),
                },
                2,
            );
        }
        let objectives: Vec<_> = log.entries.iter().map(|e| e.objective.as_str()).collect();
        assert_eq!(objectives, vec!["o2", "o3"]);
    }

    #[test]
    fn test_profile_v1_migration() {
        let v1 = json!({
            "id": "agent-1",
            "name": "builder",
            "agent_type": "coder",
            "capabilities": "rust, review,,tests ",
            "registered_at": "2024-01-01T00:00:00Z",
            "last_active": "2024-01-01T00:00:00Z",
        });
        let upgraded = upgrade::<AgentProfile>(1, v1).unwrap();
        let profile: AgentProfile = serde_json::from_value(upgraded).unwrap();
        assert_eq!(profile.capabilities, vec!["rust", "review", "tests"]);
        assert_eq!(profile.session_count, 1);
        assert_eq!(profile.status, AgentStatus::Registered);
    }

    #[test]
    fn test_enum_strings() {
        use std::str::FromStr;
        assert_eq!(Priority::from_str("critical").ok(), Some(Priority::Critical));
        assert_eq!(Outcome::Abandoned.to_string(), "abandoned");
        assert!(Priority::from_str("urgent").is_err());
    }
}
