//! Project memory: decisions, the change log and file metadata.
//!
//! Decisions are stored one record each, with a derived [`DecisionIndex`]
//! beside them. A decision save and its index update happen under the
//! project's memory guard. If the index is missing, corrupt, built with a
//! different token length, or does not cover exactly the stored decisions,
//! it is rebuilt from the full decision set.
//!
//! File metadata keeps dependency edges symmetric: declaring that A depends
//! on B records A among B's dependents in the same write.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;

use crate::{
    activity::ActivityLog,
    clock::Clock,
    config::MemoryConfig,
    index::{DecisionIndex, DecisionQuery},
    models::{
        normalize_file_path, ActivityEvent, ActivityKind, AgentId, Change, ChangeLog, Decision,
        DecisionStatus, FileMetadata, FileMetadataTable, FileType, ImpactLevel, ProjectId,
    },
    projects::ProjectRegistry,
    store::{KeyPrefix, RecordKey, RecordKind, Store},
    Error, Result,
};

const INDEX_NAME: &str = "decisions";
const CHANGE_LOG_NAME: &str = "log";
const FILE_TABLE_NAME: &str = "metadata";

/// A decision matched by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Distinct query tokens found in the decision
    pub relevance: usize,
    pub decision: Decision,
}

/// Filters for [`ProjectMemory::get_recent_changes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeQuery {
    /// Only changes with exactly this impact
    pub impact: Option<ImpactLevel>,
    /// Only changes to this file
    pub file: Option<String>,
    pub limit: Option<usize>,
}

/// Fields to set on a file's metadata. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadataUpdate {
    pub path: String,
    pub file_type: Option<FileType>,
    pub module: Option<String>,
    /// Replaces the full dependency set
    pub dependencies: Option<Vec<String>>,
    pub complexity: Option<u32>,
    pub modified_by: Option<AgentId>,
}

impl FileMetadataUpdate {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(deps.into_iter().map(Into::into).collect());
        self
    }
}

/// Decisions, changes and file metadata for every project
#[derive(Debug, Clone)]
pub struct ProjectMemory {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    projects: ProjectRegistry,
    activity: ActivityLog,
    config: MemoryConfig,
}

impl ProjectMemory {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        projects: ProjectRegistry,
        activity: ActivityLog,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            projects,
            activity,
            config,
        }
    }

    fn guard_scope(project_id: &ProjectId) -> String {
        format!("memory.{project_id}")
    }

    fn decision_key(project_id: &ProjectId, id: &str) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Decisions, project_id.as_str(), id)
    }

    fn index_key(project_id: &ProjectId) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Index, project_id.as_str(), INDEX_NAME)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DECISIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a new decision or update an existing one, and index it.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty title, a bad related path, an edit to a
    ///   superseded or archived decision, or a disallowed status change
    /// - `ProjectNotFound` if the project is unknown
    pub fn save_decision(&self, project_id: &ProjectId, decision: Decision) -> Result<Decision> {
        let mut decision = decision;
        if decision.title.trim().is_empty() {
            return Err(Error::validation("Decision title cannot be empty"));
        }
        decision.related_files = decision
            .related_files
            .iter()
            .map(|f| normalize_file_path(f))
            .collect::<Result<_>>()?;
        self.projects.ensure_exists(project_id)?;

        let key = Self::decision_key(project_id, &decision.id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;

        match self.store.load::<Decision>(&key)? {
            None => {
                if decision.status.is_frozen() {
                    return Err(Error::validation(format!(
                        "A new decision cannot start out {}",
                        decision.status
                    )));
                }
                if decision.superseded_by.is_some() {
                    return Err(Error::validation(
                        "Only superseding a decision can name its replacement",
                    ));
                }
            }
            Some(existing) => {
                if existing.status.is_frozen() && !existing.same_content(&decision) {
                    return Err(Error::validation(format!(
                        "Decision '{}' is {} and can no longer change",
                        decision.id, existing.status
                    )));
                }
                if existing.status == decision.status {
                    decision.superseded_by = existing.superseded_by;
                } else {
                    if !existing.status.can_transition_to(decision.status) {
                        return Err(Error::validation(format!(
                            "Decision '{}' cannot move from {} to {}",
                            decision.id, existing.status, decision.status
                        )));
                    }
                    decision.superseded_by = if decision.status == DecisionStatus::Superseded {
                        Some(self.check_replacement(
                            project_id,
                            &decision.id,
                            decision.superseded_by.as_deref(),
                        )?)
                    } else {
                        existing.superseded_by
                    };
                }
                self.unindex(project_id, &decision.id)?;
            }
        }

        self.store.save(&key, &decision)?;
        self.update_index(project_id, &decision)?;

        tracing::info!(project = %project_id, decision = %decision.id, title = %decision.title, "Saved decision");
        self.activity.record(
            project_id,
            vec![ActivityEvent::new(
                ActivityKind::DecisionSaved,
                self.clock.now(),
                format!("Decision saved: {}", decision.title),
            )
            .with_agent(&decision.author)
            .with_files(decision.related_files.clone())],
        );
        Ok(decision)
    }

    /// Load one decision.
    ///
    /// # Errors
    ///
    /// Returns `DecisionNotFound` if no decision has this id.
    pub fn get_decision(&self, project_id: &ProjectId, id: &str) -> Result<Decision> {
        self.projects.ensure_exists(project_id)?;
        let key = Self::decision_key(project_id, id)
            .map_err(|_| Error::DecisionNotFound(id.to_string()))?;
        self.store
            .load(&key)?
            .ok_or_else(|| Error::DecisionNotFound(id.to_string()))
    }

    /// Decisions, newest first, optionally with one status.
    pub fn list_decisions(
        &self,
        project_id: &ProjectId,
        status: Option<DecisionStatus>,
    ) -> Result<Vec<Decision>> {
        self.projects.ensure_exists(project_id)?;
        let mut decisions: Vec<Decision> = self
            .load_all_decisions(project_id)?
            .into_iter()
            .filter(|d| status.is_none_or_eq(d.status))
            .collect();
        decisions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(decisions)
    }

    /// Move a decision to a new status.
    ///
    /// Superseding requires the id of an existing replacement decision.
    pub fn update_decision_status(
        &self,
        project_id: &ProjectId,
        id: &str,
        status: DecisionStatus,
        superseded_by: Option<&str>,
    ) -> Result<Decision> {
        self.projects.ensure_exists(project_id)?;
        let key = Self::decision_key(project_id, id)
            .map_err(|_| Error::DecisionNotFound(id.to_string()))?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;

        let mut decision: Decision = self
            .store
            .load(&key)?
            .ok_or_else(|| Error::DecisionNotFound(id.to_string()))?;

        if !decision.status.can_transition_to(status) {
            return Err(Error::validation(format!(
                "Decision '{id}' cannot move from {} to {status}",
                decision.status
            )));
        }

        if status == DecisionStatus::Superseded {
            decision.superseded_by = Some(self.check_replacement(project_id, id, superseded_by)?);
        }

        let from = decision.status;
        decision.status = status;
        self.unindex(project_id, id)?;
        self.store.save(&key, &decision)?;
        self.update_index(project_id, &decision)?;

        tracing::info!(project = %project_id, decision = id, %from, to = %status, "Changed decision status");
        self.activity.record(
            project_id,
            vec![ActivityEvent::new(
                ActivityKind::DecisionStatusChanged,
                self.clock.now(),
                format!("Decision '{}' {from} -> {status}", decision.title),
            )],
        );
        Ok(decision)
    }

    /// The replacement named when superseding `id`: present, not `id`, and stored.
    fn check_replacement(
        &self,
        project_id: &ProjectId,
        id: &str,
        replacement: Option<&str>,
    ) -> Result<String> {
        let Some(replacement) = replacement else {
            return Err(Error::validation(
                "Superseding a decision requires the replacing decision's id",
            ));
        };
        if replacement == id {
            return Err(Error::validation("A decision cannot supersede itself"));
        }
        let replacement_key = Self::decision_key(project_id, replacement)
            .map_err(|_| Error::DecisionNotFound(replacement.to_string()))?;
        if !self.store.exists(&replacement_key) {
            return Err(Error::DecisionNotFound(replacement.to_string()));
        }
        Ok(replacement.to_string())
    }

    /// Search decisions by text and filters.
    ///
    /// Results are ordered by relevance, then newest first.
    pub fn search_decisions(
        &self,
        project_id: &ProjectId,
        query: &DecisionQuery,
    ) -> Result<Vec<SearchHit>> {
        self.projects.ensure_exists(project_id)?;
        let index = self.current_index(project_id)?;

        let mut hits = Vec::new();
        for (id, relevance) in index.matches(query) {
            match self.store.load::<Decision>(&Self::decision_key(project_id, &id)?)? {
                Some(decision) => hits.push(SearchHit {
                    relevance,
                    decision,
                }),
                None => tracing::debug!(decision = %id, "Indexed decision vanished"),
            }
        }

        hits.sort_by(|a, b| {
            b.relevance
                .cmp(&a.relevance)
                .then_with(|| b.decision.timestamp.cmp(&a.decision.timestamp))
                .then_with(|| a.decision.id.cmp(&b.decision.id))
        });
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    /// Rebuild the project's decision index from the stored decisions.
    pub fn rebuild_index(&self, project_id: &ProjectId) -> Result<DecisionIndex> {
        self.projects.ensure_exists(project_id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let decisions = self.load_all_decisions(project_id)?;
        if let Some(previous) = self.load_index(project_id)? {
            if !previous.is_consistent(&decisions) {
                tracing::warn!(project = %project_id, "Stored decision index had drifted");
            }
        }
        self.save_rebuilt(project_id, &decisions)
    }

    /// Index that covers exactly the stored decisions, rebuilding if needed.
    fn current_index(&self, project_id: &ProjectId) -> Result<DecisionIndex> {
        if let Some(index) = self.usable_index(project_id)? {
            return Ok(index);
        }
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        match self.usable_index(project_id)? {
            Some(index) => Ok(index),
            None => self.rebuild_index_locked(project_id),
        }
    }

    /// The stored index if it matches the decision set, else `None`.
    fn usable_index(&self, project_id: &ProjectId) -> Result<Option<DecisionIndex>> {
        let Some(index) = self.load_index(project_id)? else {
            return Ok(None);
        };
        if !self.covers_stored(project_id, &index)? {
            return Ok(None);
        }
        Ok(Some(index))
    }

    /// The stored index unless it is missing, corrupt or built with another token length.
    fn load_index(&self, project_id: &ProjectId) -> Result<Option<DecisionIndex>> {
        let index = match self.store.load::<DecisionIndex>(&Self::index_key(project_id)?) {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(None),
            Err(Error::DataCorruption { key, reason }) => {
                tracing::warn!(%key, %reason, "Decision index is corrupt");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if index.min_token_length != self.config.min_token_length {
            tracing::warn!(project = %project_id, "Decision index built with another token length");
            return Ok(None);
        }
        Ok(Some(index))
    }

    /// Whether the index holds exactly the stored decision ids.
    fn covers_stored(&self, project_id: &ProjectId, index: &DecisionIndex) -> Result<bool> {
        let stored: BTreeSet<String> = self
            .store
            .list_keys(&KeyPrefix::scoped(RecordKind::Decisions, project_id.as_str())?)?
            .into_iter()
            .map(|k| k.name().to_string())
            .collect();
        if stored != index.indexed {
            tracing::warn!(
                project = %project_id,
                stored = stored.len(),
                indexed = index.indexed.len(),
                "Decision index disagrees with stored decisions"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Drop `id` from the index before its record is rewritten, so an
    /// interrupted save leaves an id mismatch that forces a rebuild.
    /// Caller holds the memory guard.
    fn unindex(&self, project_id: &ProjectId, id: &str) -> Result<()> {
        let Some(mut index) = self.load_index(project_id)? else {
            return Ok(());
        };
        if !index.indexed.contains(id) {
            return Ok(());
        }
        index.remove(id);
        self.store.save(&Self::index_key(project_id)?, &index)
    }

    /// Upsert one freshly saved decision into the index. Caller holds the memory guard.
    fn update_index(&self, project_id: &ProjectId, decision: &Decision) -> Result<()> {
        if let Some(mut index) = self.load_index(project_id)? {
            index.upsert(decision);
            if self.covers_stored(project_id, &index)? {
                return self.store.save(&Self::index_key(project_id)?, &index);
            }
        }
        self.rebuild_index_locked(project_id).map(|_| ())
    }

    fn rebuild_index_locked(&self, project_id: &ProjectId) -> Result<DecisionIndex> {
        let decisions = self.load_all_decisions(project_id)?;
        self.save_rebuilt(project_id, &decisions)
    }

    fn save_rebuilt(&self, project_id: &ProjectId, decisions: &[Decision]) -> Result<DecisionIndex> {
        let index = DecisionIndex::rebuild(decisions, self.config.min_token_length);
        self.store.save(&Self::index_key(project_id)?, &index)?;
        tracing::info!(project = %project_id, decisions = decisions.len(), "Rebuilt decision index");
        Ok(index)
    }

    fn load_all_decisions(&self, project_id: &ProjectId) -> Result<Vec<Decision>> {
        let prefix = KeyPrefix::scoped(RecordKind::Decisions, project_id.as_str())?;
        let mut decisions = Vec::new();
        for key in self.store.list_keys(&prefix)? {
            if let Some(decision) = self.store.load::<Decision>(&key)? {
                decisions.push(decision);
            }
        }
        Ok(decisions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CHANGE LOG
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a change, pruning the oldest beyond the configured limit.
    pub fn log_change(&self, project_id: &ProjectId, change: Change) -> Result<Change> {
        let mut change = change;
        change.file = normalize_file_path(&change.file)?;
        self.projects.ensure_exists(project_id)?;

        let key = RecordKey::new(RecordKind::Changes, project_id.as_str(), CHANGE_LOG_NAME)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let mut log: ChangeLog = self.store.load(&key)?.unwrap_or_default();
        let pruned = log.push(change.clone(), self.config.change_log_limit);
        self.store.save(&key, &log)?;

        if pruned > 0 {
            tracing::debug!(project = %project_id, pruned, "Pruned change log");
        }
        tracing::info!(project = %project_id, file = %change.file, change_type = %change.change_type, "Logged change");
        self.activity.record(
            project_id,
            vec![ActivityEvent::new(
                ActivityKind::ChangeLogged,
                change.timestamp,
                format!("{} {}", change.change_type, change.file),
            )
            .with_agent(&change.agent_id)
            .with_files(vec![change.file.clone()])],
        );
        Ok(change)
    }

    /// Changes, most recent first.
    pub fn get_recent_changes(
        &self,
        project_id: &ProjectId,
        query: &ChangeQuery,
    ) -> Result<Vec<Change>> {
        self.projects.ensure_exists(project_id)?;
        let file = query.file.as_deref().map(normalize_file_path).transpose()?;
        let key = RecordKey::new(RecordKind::Changes, project_id.as_str(), CHANGE_LOG_NAME)?;
        let log: ChangeLog = self.store.load(&key)?.unwrap_or_default();

        Ok(log
            .entries
            .into_iter()
            .rev()
            .filter(|c| query.impact.is_none_or_eq(c.impact))
            .filter(|c| file.as_ref().is_none_or_eq(&c.file))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE METADATA
    // ═══════════════════════════════════════════════════════════════════════

    /// Set a file's metadata, keeping dependency edges symmetric.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad path or a file depending on itself.
    pub fn update_file_metadata(
        &self,
        project_id: &ProjectId,
        update: FileMetadataUpdate,
    ) -> Result<FileMetadata> {
        let path = normalize_file_path(&update.path)?;
        let dependencies = update
            .dependencies
            .map(|deps| {
                deps.iter()
                    .map(|d| normalize_file_path(d))
                    .collect::<Result<BTreeSet<String>>>()
            })
            .transpose()?;
        if dependencies.as_ref().is_some_and(|deps| deps.contains(&path)) {
            return Err(Error::validation(format!("File '{path}' cannot depend on itself")));
        }
        self.projects.ensure_exists(project_id)?;

        let key = RecordKey::new(RecordKind::Files, project_id.as_str(), FILE_TABLE_NAME)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let now = self.clock.now();
        let mut table: FileMetadataTable = self.store.load(&key)?.unwrap_or_default();

        let mut meta = table
            .files
            .remove(&path)
            .unwrap_or_else(|| FileMetadata::stub(path.clone(), now));

        if let Some(new_deps) = dependencies {
            for removed in meta.dependencies.difference(&new_deps) {
                if let Some(dep) = table.files.get_mut(removed) {
                    dep.dependents.remove(&path);
                }
            }
            for added in new_deps.difference(&meta.dependencies) {
                table
                    .files
                    .entry(added.clone())
                    .or_insert_with(|| FileMetadata::stub(added.clone(), now))
                    .dependents
                    .insert(path.clone());
            }
            meta.dependencies = new_deps;
        }
        if let Some(file_type) = update.file_type {
            meta.file_type = file_type;
        }
        if let Some(module) = update.module {
            meta.module = Some(module);
        }
        if let Some(complexity) = update.complexity {
            meta.complexity = Some(complexity);
        }
        if let Some(agent) = update.modified_by {
            meta.last_modified_by = Some(agent);
        }
        meta.updated_at = now;

        table.files.insert(path.clone(), meta.clone());
        self.store.save(&key, &table)?;
        tracing::debug!(project = %project_id, file = %path, "Updated file metadata");
        Ok(meta)
    }

    /// One file's metadata, if known.
    pub fn get_file_metadata(
        &self,
        project_id: &ProjectId,
        path: &str,
    ) -> Result<Option<FileMetadata>> {
        let path = normalize_file_path(path)?;
        Ok(self.file_table(project_id)?.files.remove(&path))
    }

    /// Every file's metadata, ordered by path.
    pub fn list_file_metadata(&self, project_id: &ProjectId) -> Result<Vec<FileMetadata>> {
        Ok(self.file_table(project_id)?.files.into_values().collect())
    }

    fn file_table(&self, project_id: &ProjectId) -> Result<FileMetadataTable> {
        self.projects.ensure_exists(project_id)?;
        let key = RecordKey::new(RecordKind::Files, project_id.as_str(), FILE_TABLE_NAME)?;
        Ok(self.store.load(&key)?.unwrap_or_default())
    }
}

/// `None` matches everything; `Some(x)` matches only `x`.
trait FilterExt<T> {
    fn is_none_or_eq(&self, value: T) -> bool;
}

impl<T: PartialEq> FilterExt<T> for Option<T> {
    fn is_none_or_eq(&self, value: T) -> bool {
        self.as_ref().map_or(true, |wanted| *wanted == value)
    }
}
