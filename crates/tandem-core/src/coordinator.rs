//! The coordination context: one store, one clock, every component.
//!
//! A `Coordinator` is built once at startup from a [`TandemConfig`] and
//! handed to whatever drives it. Components share the store and clock
//! through `Arc`s; there is no process-wide state.

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    activity::ActivityLog,
    agents::{AgentRegistry, AgentSelector, Registration, Switched},
    clock::{Clock, SystemClock},
    config::TandemConfig,
    index::{DecisionIndex, DecisionQuery},
    locks::{Acquired, FileLockTracker, Released},
    memory::{ChangeQuery, FileMetadataUpdate, ProjectMemory, SearchHit},
    models::{
        ActivityEvent, AgentContext, AgentId, Change, Decision, DecisionStatus, FileMetadata,
        LockRecord, Outcome, Priority, ProjectId, SessionLogEntry,
    },
    projects::{Discovered, ProjectRegistry, ProjectSelector},
    store::Store,
    Result,
};

/// Stale locks purged from one project by a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub project_id: ProjectId,
    pub reclaimed: Vec<LockRecord>,
}

/// Entry point to every coordination operation
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: TandemConfig,
    clock: Arc<dyn Clock>,
    store: Arc<Store>,
    projects: ProjectRegistry,
    agents: AgentRegistry,
    locks: FileLockTracker,
    memory: ProjectMemory,
    activity: ActivityLog,
}

impl Coordinator {
    /// Open the store at `config.root` and wire every component to the system clock.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the config is invalid or the root unusable.
    pub fn open(config: &TandemConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`Coordinator::open`] with an injected clock.
    pub fn with_clock(config: &TandemConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(Store::open(&config.root, &config.store)?);

        let projects = ProjectRegistry::new(Arc::clone(&store), Arc::clone(&clock));
        let activity = ActivityLog::new(Arc::clone(&store), config.memory.activity_limit);
        let agents = AgentRegistry::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            projects.clone(),
            config.context,
        );
        let locks = FileLockTracker::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            projects.clone(),
            activity.clone(),
            config.locks,
        );
        let memory = ProjectMemory::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            projects.clone(),
            activity.clone(),
            config.memory,
        );

        tracing::debug!(root = %config.root.display(), "Coordinator ready");
        Ok(Self {
            config: config.clone(),
            clock,
            store,
            projects,
            agents,
            locks,
            memory,
            activity,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TandemConfig {
        &self.config
    }

    /// Current time on the coordinator's clock, for stamping new records.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn projects(&self) -> &ProjectRegistry {
        &self.projects
    }

    #[must_use]
    pub const fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    #[must_use]
    pub const fn locks(&self) -> &FileLockTracker {
        &self.locks
    }

    #[must_use]
    pub const fn memory(&self) -> &ProjectMemory {
        &self.memory
    }

    // ── projects ────────────────────────────────────────────────────────────

    pub fn init_project(
        &self,
        path: &Path,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Discovered> {
        self.projects.discover(path, name, description)
    }

    pub fn resolve_project(&self, selector: &ProjectSelector) -> Result<ProjectId> {
        self.projects.resolve(selector)
    }

    pub fn resolve_agent(&self, selector: &AgentSelector) -> Result<AgentId> {
        self.agents.resolve(selector)
    }

    // ── locks ───────────────────────────────────────────────────────────────

    /// Acquire a batch of locks. `None` uses the configured default duration.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for an unregistered agent, plus every error of
    /// [`FileLockTracker::acquire`].
    pub fn acquire_locks(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        files: &[String],
        reason: &str,
        duration_minutes: Option<i64>,
    ) -> Result<Acquired> {
        self.agents.get(agent_id)?;
        let duration =
            duration_minutes.unwrap_or(self.config.locks.default_duration_minutes);
        self.locks
            .acquire(agent_id, project_id, files, reason, duration)
    }

    pub fn release_locks(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        files: &[String],
    ) -> Result<Released> {
        self.agents.get(agent_id)?;
        self.locks.release(agent_id, project_id, files)
    }

    pub fn force_release_locks(
        &self,
        project_id: &ProjectId,
        files: &[String],
        authorized_by: &AgentId,
        reason: &str,
    ) -> Result<Released> {
        self.agents.get(authorized_by)?;
        self.locks
            .force_release(project_id, files, authorized_by, reason)
    }

    pub fn query_locks(&self, project_id: &ProjectId) -> Result<Vec<LockRecord>> {
        self.locks.query(project_id)
    }

    pub fn lock_status(&self, project_id: &ProjectId, file: &str) -> Result<Option<LockRecord>> {
        self.locks.lock_status(project_id, file)
    }

    pub fn reclaim_stale(&self, project_id: &ProjectId) -> Result<Vec<LockRecord>> {
        self.locks.reclaim_stale(project_id)
    }

    /// Reclaim stale locks in every project. Projects with nothing to reclaim
    /// are left out of the report.
    pub fn sweep_all(&self) -> Result<Vec<SweepReport>> {
        let mut reports = Vec::new();
        for project in self.projects.list()? {
            let reclaimed = self.locks.reclaim_stale(&project.id)?;
            if !reclaimed.is_empty() {
                reports.push(SweepReport {
                    project_id: project.id,
                    reclaimed,
                });
            }
        }
        Ok(reports)
    }

    // ── agents ──────────────────────────────────────────────────────────────

    pub fn register_agent(
        &self,
        name: &str,
        agent_type: &str,
        capabilities: &[String],
    ) -> Result<Registration> {
        self.agents.register(name, agent_type, capabilities)
    }

    pub fn start_context(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        objective: &str,
        priority: Priority,
    ) -> Result<AgentContext> {
        self.agents
            .start_context(agent_id, project_id, objective, priority)
    }

    pub fn switch_context(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        objective: &str,
        priority: Priority,
    ) -> Result<Switched> {
        self.agents
            .switch_context(agent_id, project_id, objective, priority)
    }

    pub fn end_context(
        &self,
        agent_id: &AgentId,
        summary: &str,
        outcome: Outcome,
    ) -> Result<SessionLogEntry> {
        self.agents.end_context(agent_id, summary, outcome)
    }

    // ── memory ──────────────────────────────────────────────────────────────

    /// Save a decision. The author must be a registered agent.
    pub fn save_decision(&self, project_id: &ProjectId, decision: Decision) -> Result<Decision> {
        self.agents.get(&decision.author)?;
        self.memory.save_decision(project_id, decision)
    }

    pub fn get_decision(&self, project_id: &ProjectId, id: &str) -> Result<Decision> {
        self.memory.get_decision(project_id, id)
    }

    pub fn get_decisions(
        &self,
        project_id: &ProjectId,
        status: Option<DecisionStatus>,
    ) -> Result<Vec<Decision>> {
        self.memory.list_decisions(project_id, status)
    }

    pub fn update_decision_status(
        &self,
        project_id: &ProjectId,
        id: &str,
        status: DecisionStatus,
        superseded_by: Option<&str>,
    ) -> Result<Decision> {
        self.memory
            .update_decision_status(project_id, id, status, superseded_by)
    }

    pub fn search_decisions(
        &self,
        project_id: &ProjectId,
        query: &DecisionQuery,
    ) -> Result<Vec<SearchHit>> {
        self.memory.search_decisions(project_id, query)
    }

    /// Rebuild the decision index from the stored decisions.
    pub fn rebuild_decision_index(&self, project_id: &ProjectId) -> Result<DecisionIndex> {
        self.memory.rebuild_index(project_id)
    }

    pub fn log_change(&self, project_id: &ProjectId, change: Change) -> Result<Change> {
        self.memory.log_change(project_id, change)
    }

    pub fn get_recent_changes(
        &self,
        project_id: &ProjectId,
        query: &ChangeQuery,
    ) -> Result<Vec<Change>> {
        self.memory.get_recent_changes(project_id, query)
    }

    pub fn update_file_metadata(
        &self,
        project_id: &ProjectId,
        update: FileMetadataUpdate,
    ) -> Result<FileMetadata> {
        self.memory.update_file_metadata(project_id, update)
    }

    pub fn get_file_metadata(
        &self,
        project_id: &ProjectId,
        path: &str,
    ) -> Result<Option<FileMetadata>> {
        self.memory.get_file_metadata(project_id, path)
    }

    /// Most recent journal events first.
    pub fn recent_activity(
        &self,
        project_id: &ProjectId,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>> {
        self.projects.ensure_exists(project_id)?;
        self.activity.recent(project_id, limit)
    }
}
