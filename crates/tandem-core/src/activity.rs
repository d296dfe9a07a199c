//! Per-project activity journal.
//!
//! The lock tracker and the memory store append an event here after each
//! committed mutation. Journal writes are best effort: a failure is logged
//! and never undoes the operation that produced the event.

use std::sync::Arc;

use crate::{
    models::{ActivityEvent, ActivityJournal, ProjectId},
    store::{RecordKey, RecordKind, Store},
    Result,
};

const JOURNAL_NAME: &str = "journal";

/// Appends to and reads from project journals
#[derive(Debug, Clone)]
pub struct ActivityLog {
    store: Arc<Store>,
    limit: usize,
}

impl ActivityLog {
    #[must_use]
    pub const fn new(store: Arc<Store>, limit: usize) -> Self {
        Self { store, limit }
    }

    fn key(project_id: &ProjectId) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Activity, project_id.as_str(), JOURNAL_NAME)
    }

    /// Append events to a project's journal.
    pub fn append(&self, project_id: &ProjectId, events: Vec<ActivityEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let key = Self::key(project_id)?;
        let _guard = self.store.guard(&format!("activity.{project_id}"))?;

        let mut journal: ActivityJournal = self.store.load(&key)?.unwrap_or_default();
        journal.extend(events, self.limit);
        self.store.save(&key, &journal)
    }

    /// Append, logging instead of failing.
    pub(crate) fn record(&self, project_id: &ProjectId, events: Vec<ActivityEvent>) {
        if let Err(e) = self.append(project_id, events) {
            tracing::warn!(project = %project_id, error = %e, "Failed to write activity journal");
        }
    }

    /// Most recent events first.
    pub fn recent(&self, project_id: &ProjectId, limit: usize) -> Result<Vec<ActivityEvent>> {
        let journal: ActivityJournal = self
            .store
            .load(&Self::key(project_id)?)?
            .unwrap_or_default();
        Ok(journal.events.into_iter().rev().take(limit).collect())
    }
}
