//! Change log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{migrate::Versioned, models::AgentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
    Refactored,
}

/// How far-reaching a change is
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
pub enum ImpactLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// One logged change to a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub file: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub description: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub impact: ImpactLevel,
    pub timestamp: DateTime<Utc>,
}

impl Change {
    #[must_use]
    pub fn new(
        file: impl Into<String>,
        change_type: ChangeType,
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("chg-{}", uuid::Uuid::new_v4().simple()),
            file: file.into(),
            change_type,
            description: String::new(),
            agent_id,
            impact: ImpactLevel::default(),
            timestamp,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn with_impact(mut self, impact: ImpactLevel) -> Self {
        self.impact = impact;
        self
    }
}

/// Per-project change log, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    #[serde(default)]
    pub entries: Vec<Change>,
}

impl ChangeLog {
    /// Append a change, pruning the oldest beyond `limit`. Returns how many were pruned.
    pub fn push(&mut self, change: Change, limit: usize) -> usize {
        self.entries.push(change);
        let excess = self.entries.len().saturating_sub(limit);
        self.entries.drain(..excess);
        excess
    }
}

impl Versioned for ChangeLog {
    const KIND: &'static str = "change_log";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_prunes_oldest() {
        let mut log = ChangeLog::default();
        let mut pruned = 0;
        for i in 0..5 {
            pruned += log.push(
                Change::new(format!("f{i}"), ChangeType::Modified, AgentId::new("a"), Utc::now()),
                3,
            );
        }
        assert_eq!(pruned, 2);
        assert_eq!(log.entries.first().unwrap().file, "f2");
        assert_eq!(log.entries.last().unwrap().file, "f4");
    }

    #[test]
    fn test_impact_ordering() {
        assert!(ImpactLevel::Critical > ImpactLevel::High);
        assert!(ImpactLevel::Low < ImpactLevel::Medium);
    }
}
