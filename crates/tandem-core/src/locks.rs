//! File lock tracker for agent coordination.
//!
//! Gives agents exclusive, time-bounded claims on files inside a project.
//! Each project's locks live in one lock table record. Every mutation runs
//! the full read → reclaim → check → commit sequence while holding the
//! project's store guard, so two processes can never both win the same file.
//!
//! # Batches
//!
//! Acquisition is all-or-nothing: every requested file is checked before any
//! lock is written. If one file is held by another agent the whole batch
//! fails and reports every conflict. Re-acquiring a file you already hold
//! refreshes its expiry.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;

use serde::Serialize;

use crate::{
    activity::ActivityLog,
    clock::Clock,
    config::LockConfig,
    error::LockConflict,
    models::{
        normalize_file_path, ActivityEvent, ActivityKind, AgentId, LockRecord, LockTable,
        ProjectId,
    },
    projects::ProjectRegistry,
    store::{RecordKey, RecordKind, Store},
    Error, Result,
};

const TABLE_NAME: &str = "table";

/// Response returned when a batch is acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquired {
    /// Every lock now held for the batch, in request order
    pub acquired: Vec<LockRecord>,
    /// Files the agent already held and whose expiry was extended
    pub refreshed: Vec<String>,
}

/// Outcome of a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Released {
    pub released: Vec<String>,
    /// Requested files that had no active lock
    pub not_held: Vec<String>,
}

/// Tracks file locks per project
#[derive(Debug, Clone)]
pub struct FileLockTracker {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    projects: ProjectRegistry,
    activity: ActivityLog,
    config: LockConfig,
}

impl FileLockTracker {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        projects: ProjectRegistry,
        activity: ActivityLog,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            clock,
            projects,
            activity,
            config,
        }
    }

    fn table_key(project_id: &ProjectId) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Locks, project_id.as_str(), TABLE_NAME)
    }

    fn guard_scope(project_id: &ProjectId) -> String {
        format!("locks.{project_id}")
    }

    /// Lock every file in `files` for `agent_id`, or none of them.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive or over-limit duration or a bad path
    /// - `ProjectNotFound` if the project is unknown
    /// - `LockConflict` listing every file held by another agent
    pub fn acquire(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        files: &[String],
        reason: &str,
        duration_minutes: i64,
    ) -> Result<Acquired> {
        self.validate_duration(duration_minutes)?;
        let files = normalize_batch(files)?;
        if files.is_empty() {
            return Ok(Acquired {
                acquired: Vec::new(),
                refreshed: Vec::new(),
            });
        }
        self.projects.ensure_exists(project_id)?;

        let key = Self::table_key(project_id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let now = self.clock.now();

        let mut table: LockTable = self.store.load(&key)?.unwrap_or_default();
        let reclaimed = table.reclaim_expired(now);

        let conflicts: Vec<LockConflict> = files
            .iter()
            .filter_map(|file| table.active(file, now))
            .filter(|held| &held.agent_id != agent_id)
            .map(|held| LockConflict {
                file: held.file.clone(),
                owner: held.agent_id.to_string(),
                reason: held.reason.clone(),
                expires_at: held.expires_at,
            })
            .collect();

        if !conflicts.is_empty() {
            if !reclaimed.is_empty() {
                self.store.save(&key, &table)?;
                self.journal_reclaimed(project_id, reclaimed);
            }
            tracing::info!(
                agent = %agent_id,
                project = %project_id,
                conflicts = conflicts.len(),
                "Lock request rejected"
            );
            return Err(Error::LockConflict { conflicts });
        }

        let mut acquired = Vec::with_capacity(files.len());
        let mut refreshed = Vec::new();
        for file in files {
            if table.active(&file, now).is_some() {
                refreshed.push(file.clone());
            }
            let record = LockRecord::new(
                file.clone(),
                agent_id.clone(),
                reason.to_string(),
                now,
                duration_minutes,
            )?;
            table.locks.insert(file, record.clone());
            acquired.push(record);
        }

        self.store.save(&key, &table)?;
        tracing::info!(
            agent = %agent_id,
            project = %project_id,
            files = acquired.len(),
            refreshed = refreshed.len(),
            duration_minutes,
            "Acquired locks"
        );

        self.journal_reclaimed(project_id, reclaimed);
        self.activity.record(
            project_id,
            vec![ActivityEvent::new(
                ActivityKind::LockAcquired,
                now,
                format!("Locked for {duration_minutes}m: {reason}"),
            )
            .with_agent(agent_id)
            .with_files(acquired.iter().map(|l| l.file.clone()).collect())],
        );

        Ok(Acquired {
            acquired,
            refreshed,
        })
    }

    /// Release locks held by `agent_id`.
    ///
    /// Nothing is released if any requested file is held by someone else.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty file list or a bad path
    /// - `LockAuthorization` listing files owned by other agents
    pub fn release(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        files: &[String],
    ) -> Result<Released> {
        let files = normalize_batch(files)?;
        if files.is_empty() {
            return Err(Error::validation("No files given to release"));
        }
        self.projects.ensure_exists(project_id)?;

        let key = Self::table_key(project_id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let now = self.clock.now();

        let mut table: LockTable = self.store.load(&key)?.unwrap_or_default();
        let reclaimed = table.reclaim_expired(now);

        let foreign: Vec<String> = files
            .iter()
            .filter(|file| {
                table
                    .active(file, now)
                    .is_some_and(|held| &held.agent_id != agent_id)
            })
            .cloned()
            .collect();

        if !foreign.is_empty() {
            if !reclaimed.is_empty() {
                self.store.save(&key, &table)?;
                self.journal_reclaimed(project_id, reclaimed);
            }
            tracing::warn!(agent = %agent_id, project = %project_id, files = ?foreign, "Release of foreign locks rejected");
            return Err(Error::LockAuthorization {
                agent_id: agent_id.to_string(),
                files: foreign,
            });
        }

        let mut outcome = Released::default();
        for file in files {
            if table.locks.remove(&file).is_some() {
                outcome.released.push(file);
            } else {
                outcome.not_held.push(file);
            }
        }

        if !outcome.released.is_empty() || !reclaimed.is_empty() {
            self.store.save(&key, &table)?;
        }
        if !outcome.not_held.is_empty() {
            tracing::debug!(agent = %agent_id, files = ?outcome.not_held, "Release of files not held");
        }
        tracing::info!(agent = %agent_id, project = %project_id, released = outcome.released.len(), "Released locks");

        self.journal_reclaimed(project_id, reclaimed);
        if !outcome.released.is_empty() {
            self.activity.record(
                project_id,
                vec![ActivityEvent::new(ActivityKind::LockReleased, now, "Released locks")
                    .with_agent(agent_id)
                    .with_files(outcome.released.clone())],
            );
        }
        Ok(outcome)
    }

    /// Remove locks regardless of owner. The override is journaled.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty file list or an empty reason.
    pub fn force_release(
        &self,
        project_id: &ProjectId,
        files: &[String],
        authorized_by: &AgentId,
        reason: &str,
    ) -> Result<Released> {
        let files = normalize_batch(files)?;
        if files.is_empty() {
            return Err(Error::validation("No files given to release"));
        }
        if reason.trim().is_empty() {
            return Err(Error::validation("A forced release needs a reason"));
        }
        self.projects.ensure_exists(project_id)?;

        let key = Self::table_key(project_id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;
        let now = self.clock.now();

        let mut table: LockTable = self.store.load(&key)?.unwrap_or_default();
        let reclaimed = table.reclaim_expired(now);

        let mut outcome = Released::default();
        let mut events = Vec::new();
        for file in files {
            match table.locks.remove(&file) {
                Some(previous) => {
                    tracing::warn!(
                        project = %project_id,
                        file = %file,
                        owner = %previous.agent_id,
                        authorized_by = %authorized_by,
                        reason,
                        "Forced lock release"
                    );
                    events.push(
                        ActivityEvent::new(
                            ActivityKind::LockOverridden,
                            now,
                            format!("Took lock from {}: {reason}", previous.agent_id),
                        )
                        .with_agent(authorized_by)
                        .with_files(vec![file.clone()]),
                    );
                    outcome.released.push(file);
                }
                None => outcome.not_held.push(file),
            }
        }

        if !outcome.released.is_empty() || !reclaimed.is_empty() {
            self.store.save(&key, &table)?;
        }
        self.journal_reclaimed(project_id, reclaimed);
        self.activity.record(project_id, events);
        Ok(outcome)
    }

    /// Every active lock in the project, ordered by file.
    pub fn query(&self, project_id: &ProjectId) -> Result<Vec<LockRecord>> {
        self.projects.ensure_exists(project_id)?;
        let table: LockTable = self
            .store
            .load(&Self::table_key(project_id)?)?
            .unwrap_or_default();
        Ok(table.active_locks(self.clock.now()))
    }

    /// The active lock on one file, if any.
    pub fn lock_status(&self, project_id: &ProjectId, file: &str) -> Result<Option<LockRecord>> {
        let file = normalize_file_path(file)?;
        self.projects.ensure_exists(project_id)?;
        let table: LockTable = self
            .store
            .load(&Self::table_key(project_id)?)?
            .unwrap_or_default();
        Ok(table.active(&file, self.clock.now()).cloned())
    }

    /// Purge every expired lock in the project. Idempotent.
    pub fn reclaim_stale(&self, project_id: &ProjectId) -> Result<Vec<LockRecord>> {
        self.projects.ensure_exists(project_id)?;
        let key = Self::table_key(project_id)?;
        let _guard = self.store.guard(&Self::guard_scope(project_id))?;

        let Some(mut table) = self.store.load::<LockTable>(&key)? else {
            return Ok(Vec::new());
        };
        let reclaimed = table.reclaim_expired(self.clock.now());
        if !reclaimed.is_empty() {
            self.store.save(&key, &table)?;
            self.journal_reclaimed(project_id, reclaimed.clone());
        }
        Ok(reclaimed)
    }

    fn validate_duration(&self, duration_minutes: i64) -> Result<()> {
        if duration_minutes <= 0 {
            return Err(Error::validation(format!(
                "Lock duration must be positive, got {duration_minutes} minutes"
            )));
        }
        if duration_minutes > self.config.max_duration_minutes {
            return Err(Error::validation(format!(
                "Lock duration {duration_minutes} minutes exceeds the maximum of {}",
                self.config.max_duration_minutes
            )));
        }
        Ok(())
    }

    fn journal_reclaimed(&self, project_id: &ProjectId, reclaimed: Vec<LockRecord>) {
        if reclaimed.is_empty() {
            return;
        }
        let now = self.clock.now();
        let events = reclaimed
            .into_iter()
            .map(|lock| {
                tracing::warn!(
                    project = %project_id,
                    file = %lock.file,
                    owner = %lock.agent_id,
                    expired_at = %lock.expires_at,
                    "Reclaimed stale lock"
                );
                ActivityEvent::new(
                    ActivityKind::LockReclaimed,
                    now,
                    format!("Expired lock of {} reclaimed", lock.agent_id),
                )
                .with_agent(&lock.agent_id)
                .with_files(vec![lock.file])
            })
            .collect();
        self.activity.record(project_id, events);
    }
}

/// Normalise paths and drop duplicates, keeping first-seen order.
fn normalize_batch(files: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(files.len());
    for raw in files {
        let file = normalize_file_path(raw)?;
        if !out.contains(&file) {
            out.push(file);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, config::StoreConfig};
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        tracker: FileLockTracker,
        project: ProjectId,
        activity: ActivityLog,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data"), &StoreConfig::default()).unwrap());
        let clock = Arc::new(ManualClock::starting_now());
        let projects = ProjectRegistry::new(store.clone(), clock.clone());
        let project = projects
            .discover(&dir.path().join("ws"), None, None)
            .unwrap()
            .project
            .id;
        let activity = ActivityLog::new(store.clone(), 100);
        let tracker = FileLockTracker::new(
            store,
            clock.clone(),
            projects,
            activity.clone(),
            LockConfig::default(),
        );
        Fixture {
            _dir: dir,
            clock,
            tracker,
            project,
            activity,
        }
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_zero_files_is_trivial_success() {
        let f = fixture();
        let out = f
            .tracker
            .acquire(&"a1".into(), &f.project, &[], "noop", 5)
            .unwrap();
        assert!(out.acquired.is_empty());
    }

    #[test]
    fn test_duration_bounds() {
        let f = fixture();
        let a1 = AgentId::new("a1");
        for bad in [0, -5, LockConfig::default().max_duration_minutes + 1] {
            assert!(matches!(
                f.tracker.acquire(&a1, &f.project, &files(&["x"]), "r", bad),
                Err(Error::Validation(_))
            ));
        }
        assert!(f
            .tracker
            .acquire(&a1, &f.project, &files(&["x"]), "r", LockConfig::default().max_duration_minutes)
            .is_ok());
    }

    #[test]
    fn test_unknown_project() {
        let f = fixture();
        assert!(matches!(
            f.tracker.acquire(&"a1".into(), &"missing".into(), &files(&["x"]), "r", 5),
            Err(Error::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_same_agent_refresh_extends_expiry() {
        let f = fixture();
        let a1 = AgentId::new("a1");
        let first = f
            .tracker
            .acquire(&a1, &f.project, &files(&["src/x.rs"]), "r", 10)
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        let second = f
            .tracker
            .acquire(&a1, &f.project, &files(&["./src/x.rs"]), "r", 10)
            .unwrap();
        assert_eq!(second.refreshed, vec!["src/x.rs"]);
        assert!(second.acquired[0].expires_at > first.acquired[0].expires_at);
        assert_eq!(f.tracker.query(&f.project).unwrap().len(), 1);
    }

    #[test]
    fn test_release_is_owner_only_and_all_or_nothing() {
        let f = fixture();
        let (a1, a2) = (AgentId::new("a1"), AgentId::new("a2"));
        f.tracker.acquire(&a1, &f.project, &files(&["a"]), "r", 10).unwrap();
        f.tracker.acquire(&a2, &f.project, &files(&["b"]), "r", 10).unwrap();

        let err = f
            .tracker
            .release(&a1, &f.project, &files(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, Error::LockAuthorization { ref files, .. } if files == &["b"]));
        assert_eq!(f.tracker.query(&f.project).unwrap().len(), 2);

        let out = f
            .tracker
            .release(&a1, &f.project, &files(&["a", "never"]))
            .unwrap();
        assert_eq!(out.released, vec!["a"]);
        assert_eq!(out.not_held, vec!["never"]);
        assert!(f.tracker.lock_status(&f.project, "a").unwrap().is_none());
    }

    #[test]
    fn test_release_empty_list_rejected() {
        let f = fixture();
        assert!(matches!(
            f.tracker.release(&"a1".into(), &f.project, &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_force_release_overrides_owner_and_journals() {
        let f = fixture();
        f.tracker
            .acquire(&"a1".into(), &f.project, &files(&["a"]), "r", 10)
            .unwrap();

        assert!(f
            .tracker
            .force_release(&f.project, &files(&["a"]), &"lead".into(), " ")
            .is_err());
        let out = f
            .tracker
            .force_release(&f.project, &files(&["a"]), &"lead".into(), "agent crashed")
            .unwrap();
        assert_eq!(out.released, vec!["a"]);
        assert!(f.tracker.query(&f.project).unwrap().is_empty());

        let recent = f.activity.recent(&f.project, 1).unwrap();
        assert_eq!(recent[0].kind, ActivityKind::LockOverridden);
        assert_eq!(recent[0].agent_id, Some(AgentId::new("lead")));
    }

    #[test]
    fn test_expired_lock_is_reacquirable_by_anyone() {
        let f = fixture();
        f.tracker
            .acquire(&"a1".into(), &f.project, &files(&["x"]), "r", 1)
            .unwrap();
        f.clock.advance(Duration::minutes(1));
        assert!(f.tracker.query(&f.project).unwrap().is_empty());

        let out = f
            .tracker
            .acquire(&"a2".into(), &f.project, &files(&["x"]), "r", 1)
            .unwrap();
        assert_eq!(out.acquired[0].agent_id, AgentId::new("a2"));
        assert!(out.refreshed.is_empty());
    }

    #[test]
    fn test_invalid_path_fails_whole_batch() {
        let f = fixture();
        assert!(matches!(
            f.tracker
                .acquire(&"a1".into(), &f.project, &files(&["ok", "../escape"]), "r", 5),
            Err(Error::Validation(_))
        ));
        assert!(f.tracker.query(&f.project).unwrap().is_empty());
    }
}
