//! Architectural decisions: permanently recorded rationale for a technical choice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

use crate::{
    migrate::{as_object, Migration, Versioned},
    models::AgentId,
};

/// Decision lifecycle status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    #[default]
    Accepted,
    Superseded,
    Deprecated,
    Archived,
}

impl DecisionStatus {
    /// Whether the decision's content is frozen
    #[must_use]
    pub const fn is_frozen(self) -> bool {
        matches!(self, Self::Superseded | Self::Archived)
    }

    /// Allowed status transitions.
    ///
    /// Archived is terminal; superseded and deprecated may only be archived.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Proposed, Self::Accepted)
            | (Self::Proposed | Self::Accepted, Self::Superseded | Self::Deprecated)
            | (
                Self::Proposed | Self::Accepted | Self::Superseded | Self::Deprecated,
                Self::Archived,
            ) => true,
            _ => false,
        }
    }
}

/// A recorded decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: AgentId,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub status: DecisionStatus,
    #[serde(default)]
    pub superseded_by: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// A new accepted decision with a fresh id.
    #[must_use]
    pub fn new(title: impl Into<String>, author: AgentId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: format!("dec-{}", uuid::Uuid::new_v4().simple()),
            title: title.into(),
            description: String::new(),
            rationale: String::new(),
            tags: Vec::new(),
            author,
            related_files: Vec::new(),
            status: DecisionStatus::default(),
            superseded_by: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_related_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_files = files.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: DecisionStatus) -> Self {
        self.status = status;
        self
    }

    /// Equal apart from status fields
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.rationale == other.rationale
            && self.tags == other.tags
            && self.author == other.author
            && self.related_files == other.related_files
            && self.timestamp == other.timestamp
    }
}

/// v1 called related files `files` and could omit status
fn rename_files(mut payload: Value) -> Result<Value, String> {
    let obj = as_object(&mut payload)?;
    if let Some(files) = obj.remove("files") {
        obj.entry("related_files").or_insert(files);
    }
    if matches!(obj.get("status"), None | Some(Value::Null)) {
        obj.insert("status".into(), json!("accepted"));
    }
    Ok(payload)
}

const DECISION_MIGRATIONS: &[Migration] = &[Migration {
    from_version: 1,
    description: "files renamed to related_files; status defaults to accepted",
    apply: rename_files,
}];

impl Versioned for Decision {
    const KIND: &'static str = "decision";
    const SCHEMA_VERSION: u32 = 2;

    fn migrations() -> &'static [Migration] {
        DECISION_MIGRATIONS
    }
}
