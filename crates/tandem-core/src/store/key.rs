//! Record keys: `(kind, scope, name)` mapped onto `<root>/<kind>/<scope>/<name>.json`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

/// Extension used for every committed record
pub(crate) const RECORD_EXTENSION: &str = "json";

/// Maximum length of a single key segment
const MAX_SEGMENT_LENGTH: usize = 128;

/// Top-level namespace of a record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Project descriptors
    Projects,
    /// Agent profiles, context state and session logs
    Agents,
    /// Name and path lookup tables
    Registry,
    /// Per-project lock tables
    Locks,
    /// Decisions, one record each
    Decisions,
    /// Search indexes
    Index,
    /// Per-project change logs
    Changes,
    /// Per-project file metadata
    Files,
    /// Per-project activity journals
    Activity,
}

/// Fully-qualified record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    kind: RecordKind,
    scope: String,
    name: String,
}

impl RecordKey {
    /// Build a key, validating the scope and name segments.
    pub fn new(kind: RecordKind, scope: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let scope = scope.into();
        let name = name.into();
        validate_segment(&scope)?;
        validate_segment(&name)?;
        Ok(Self { kind, scope, name })
    }

    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.kind
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this record
    pub(crate) fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.kind.to_string()).join(&self.scope)
    }

    /// Final path of this record
    pub(crate) fn path(&self, root: &Path) -> PathBuf {
        self.dir(root)
            .join(format!("{}.{RECORD_EXTENSION}", self.name))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.scope, self.name)
    }
}

/// A prefix for [`crate::store::Store::list_keys`]: a kind, optionally narrowed to one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    pub(crate) kind: RecordKind,
    pub(crate) scope: Option<String>,
}

impl KeyPrefix {
    /// Every key of a kind
    #[must_use]
    pub const fn kind(kind: RecordKind) -> Self {
        Self { kind, scope: None }
    }

    /// Every key of a kind within one scope
    pub fn scoped(kind: RecordKind, scope: impl Into<String>) -> Result<Self> {
        let scope = scope.into();
        validate_segment(&scope)?;
        Ok(Self {
            kind,
            scope: Some(scope),
        })
    }
}

/// Validate one path segment of a key.
///
/// Segments must be 1-128 ASCII alphanumerics, `-`, `_` or `.`, must not
/// start with `.` and must not contain `..`.
pub(crate) fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LENGTH {
        return Err(Error::validation(format!(
            "Key segment must be 1-{MAX_SEGMENT_LENGTH} characters: '{segment}'"
        )));
    }

    if segment.starts_with('.') || segment.contains("..") {
        return Err(Error::validation(format!(
            "Key segment cannot start with '.' or contain '..': '{segment}'"
        )));
    }

    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::validation(format!(
            "Key segment may only contain ASCII alphanumerics, '-', '_' or '.': '{segment}'"
        )));
    }

    Ok(())
}
