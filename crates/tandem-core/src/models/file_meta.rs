//! File metadata and the dependency graph between files.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{migrate::Versioned, models::AgentId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileType {
    Source,
    Test,
    Config,
    Documentation,
    #[default]
    Other,
}

/// What the project knows about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub module: Option<String>,
    /// Files this file depends on
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Files depending on this file; maintained from the other side
    #[serde(default)]
    pub dependents: BTreeSet<String>,
    #[serde(default)]
    pub complexity: Option<u32>,
    #[serde(default)]
    pub last_modified_by: Option<AgentId>,
    pub updated_at: DateTime<Utc>,
}

impl FileMetadata {
    /// Bare entry for a file known only through another file's edges
    #[must_use]
    pub fn stub(path: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::default(),
            module: None,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            complexity: None,
            last_modified_by: None,
            updated_at,
        }
    }
}

/// Every file's metadata in one project, keyed by path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataTable {
    #[serde(default)]
    pub files: BTreeMap<String, FileMetadata>,
}

impl FileMetadataTable {
    /// Whether every dependency edge has its matching dependent edge and vice versa.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.files.values().all(|meta| {
            meta.dependencies.iter().all(|dep| {
                self.files
                    .get(dep)
                    .is_some_and(|d| d.dependents.contains(&meta.path))
            }) && meta.dependents.iter().all(|dependent| {
                self.files
                    .get(dependent)
                    .is_some_and(|d| d.dependencies.contains(&meta.path))
            })
        })
    }
}

impl Versioned for FileMetadataTable {
    const KIND: &'static str = "file_metadata_table";
}
