//! Agent registry and context manager.
//!
//! Agents are identified across sessions by name: registering a known name
//! reconnects to the existing identity instead of creating a new one. Each
//! agent carries at most one current context (project + objective), a bounded
//! history of archived contexts, and a bounded session log.
//!
//! Contexts are independent of locks. Switching or ending a context never
//! releases the agent's file locks.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;

use serde::Serialize;

use crate::{
    clock::Clock,
    config::ContextConfig,
    models::{
        AgentContext, AgentId, AgentNameIndex, AgentProfile, AgentStatus, ContextState,
        EndReason, Outcome, Priority, ProjectId, SessionLog, SessionLogEntry,
    },
    projects::ProjectRegistry,
    store::{KeyPrefix, RecordKey, RecordKind, Store},
    Error, Result,
};

const PROFILE_NAME: &str = "profile";
const CONTEXT_NAME: &str = "context";
const SESSIONS_NAME: &str = "sessions";
const REGISTRY_SCOPE: &str = "agents";
const NAME_INDEX_NAME: &str = "names";
const REGISTRY_GUARD: &str = "registry.agents";

/// Identifies an agent by id or name. Id wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSelector {
    pub id: Option<AgentId>,
    pub name: Option<String>,
}

impl AgentSelector {
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(AgentId::new(id)),
            name: None,
        }
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

/// Result of registering an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub agent_id: AgentId,
    /// True when the name was already registered
    pub reconnected: bool,
    /// Context the agent was last working in, if any
    pub restored_context: Option<AgentContext>,
    pub profile: AgentProfile,
}

/// Result of switching contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Switched {
    pub previous: Option<AgentContext>,
    pub current: AgentContext,
}

/// Registers agents and drives their context lifecycle
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    projects: ProjectRegistry,
    config: ContextConfig,
}

impl AgentRegistry {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        projects: ProjectRegistry,
        config: ContextConfig,
    ) -> Self {
        Self {
            store,
            clock,
            projects,
            config,
        }
    }

    fn key(agent_id: &AgentId, name: &str) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Agents, agent_id.as_str(), name)
            .map_err(|_| Error::AgentNotFound(agent_id.to_string()))
    }

    fn name_index_key() -> Result<RecordKey> {
        RecordKey::new(RecordKind::Registry, REGISTRY_SCOPE, NAME_INDEX_NAME)
    }

    fn agent_guard(agent_id: &AgentId) -> String {
        format!("agents.{agent_id}")
    }

    /// Register an agent, reconnecting if the name is already known.
    ///
    /// A reconnect keeps the agent's id, increments its session count,
    /// refreshes its type and capabilities, and reports the context it was
    /// last working in.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty name.
    pub fn register(
        &self,
        name: &str,
        agent_type: &str,
        capabilities: &[String],
    ) -> Result<Registration> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Agent name cannot be empty"));
        }
        let capabilities: Vec<String> = capabilities
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let _registry = self.store.guard(REGISTRY_GUARD)?;
        let index_key = Self::name_index_key()?;
        let mut index: AgentNameIndex = self.store.load(&index_key)?.unwrap_or_default();
        let now = self.clock.now();

        if let Some(agent_id) = index.by_name.get(name).cloned() {
            let _agent = self.store.guard(&Self::agent_guard(&agent_id))?;
            let profile_key = Self::key(&agent_id, PROFILE_NAME)?;
            if let Some(mut profile) = self.store.load::<AgentProfile>(&profile_key)? {
                profile.session_count = profile.session_count.saturating_add(1);
                profile.last_active = now;
                if !agent_type.trim().is_empty() {
                    profile.agent_type = agent_type.trim().to_string();
                }
                if !capabilities.is_empty() {
                    profile.capabilities = capabilities;
                }
                self.store.save(&profile_key, &profile)?;

                let state: ContextState = self
                    .store
                    .load(&Self::key(&agent_id, CONTEXT_NAME)?)?
                    .unwrap_or_default();
                let restored_context = state.last_saved().cloned();

                tracing::info!(
                    agent = %agent_id,
                    name,
                    sessions = profile.session_count,
                    restored = restored_context.is_some(),
                    "Agent reconnected"
                );
                return Ok(Registration {
                    agent_id,
                    reconnected: true,
                    restored_context,
                    profile,
                });
            }
            tracing::warn!(agent = %agent_id, name, "Name index points at a missing profile, re-registering");
        }

        let profile = AgentProfile {
            id: AgentId::generate(),
            name: name.to_string(),
            agent_type: agent_type.trim().to_string(),
            capabilities,
            registered_at: now,
            last_active: now,
            session_count: 1,
            status: AgentStatus::Registered,
        };
        self.store
            .save(&Self::key(&profile.id, PROFILE_NAME)?, &profile)?;
        index.by_name.insert(name.to_string(), profile.id.clone());
        self.store.save(&index_key, &index)?;

        tracing::info!(agent = %profile.id, name, "Registered agent");
        Ok(Registration {
            agent_id: profile.id.clone(),
            reconnected: false,
            restored_context: None,
            profile,
        })
    }

    /// Load an agent's profile.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for an unknown id.
    pub fn get(&self, agent_id: &AgentId) -> Result<AgentProfile> {
        self.store
            .load(&Self::key(agent_id, PROFILE_NAME)?)?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))
    }

    /// Every agent, ordered by name.
    pub fn list(&self) -> Result<Vec<AgentProfile>> {
        let mut agents = Vec::new();
        for key in self.store.list_keys(&KeyPrefix::kind(RecordKind::Agents))? {
            if key.name() != PROFILE_NAME {
                continue;
            }
            if let Some(profile) = self.store.load::<AgentProfile>(&key)? {
                agents.push(profile);
            }
        }
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    /// Resolve a selector to one agent id.
    pub fn resolve(&self, selector: &AgentSelector) -> Result<AgentId> {
        if let Some(id) = &selector.id {
            return self.get(id).map(|p| p.id);
        }
        if let Some(name) = &selector.name {
            let index: AgentNameIndex = self
                .store
                .load(&Self::name_index_key()?)?
                .unwrap_or_default();
            return index
                .by_name
                .get(name.trim())
                .cloned()
                .ok_or_else(|| Error::AgentNotFound(name.clone()));
        }
        Err(Error::validation("Agent selector needs an id or a name"))
    }

    /// Current context and archived history.
    pub fn context_state(&self, agent_id: &AgentId) -> Result<ContextState> {
        self.get(agent_id)?;
        Ok(self
            .store
            .load(&Self::key(agent_id, CONTEXT_NAME)?)?
            .unwrap_or_default())
    }

    /// Closing entries, oldest first.
    pub fn session_log(&self, agent_id: &AgentId) -> Result<Vec<SessionLogEntry>> {
        self.get(agent_id)?;
        let log: SessionLog = self
            .store
            .load(&Self::key(agent_id, SESSIONS_NAME)?)?
            .unwrap_or_default();
        Ok(log.entries)
    }

    /// Install (or overwrite) the agent's current context.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound`, `ProjectNotFound`, or `Validation` for an
    /// empty objective.
    pub fn start_context(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        objective: &str,
        priority: Priority,
    ) -> Result<AgentContext> {
        let context = self.new_context(project_id, objective, priority)?;
        self.transition(agent_id, AgentStatus::Active, |state| {
            state.current = Some(context.clone());
            Ok(())
        })?;
        tracing::info!(agent = %agent_id, project = %project_id, objective, "Started context");
        Ok(context)
    }

    /// Archive the current context and install a new one.
    pub fn switch_context(
        &self,
        agent_id: &AgentId,
        project_id: &ProjectId,
        objective: &str,
        priority: Priority,
    ) -> Result<Switched> {
        let context = self.new_context(project_id, objective, priority)?;
        let now = self.clock.now();
        let limit = self.config.history_limit;
        let mut previous = None;
        self.transition(agent_id, AgentStatus::Active, |state| {
            previous = state.archive_current(now, EndReason::Switched, limit);
            state.current = Some(context.clone());
            Ok(())
        })?;
        tracing::info!(
            agent = %agent_id,
            from = ?previous.as_ref().map(|c| c.project_id.to_string()),
            to = %project_id,
            "Switched context"
        );
        Ok(Switched {
            previous,
            current: context,
        })
    }

    /// Archive and clear the current context, closing the session.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the agent has no current context.
    pub fn end_context(
        &self,
        agent_id: &AgentId,
        summary: &str,
        outcome: Outcome,
    ) -> Result<SessionLogEntry> {
        let now = self.clock.now();
        let limit = self.config.history_limit;
        let log_key = Self::key(agent_id, SESSIONS_NAME)?;
        let mut ended = None;
        // The session log is written before the context is cleared, under the same guard
        self.transition(agent_id, AgentStatus::Paused, |state| {
            let context = state
                .archive_current(now, EndReason::Ended, limit)
                .ok_or_else(|| no_context(agent_id))?;
            let entry = SessionLogEntry {
                project_id: context.project_id,
                objective: context.objective,
                summary: summary.to_string(),
                outcome,
                started_at: context.started_at,
                ended_at: now,
            };
            let mut log: SessionLog = self.store.load(&log_key)?.unwrap_or_default();
            log.push(entry.clone(), self.config.session_log_limit);
            self.store.save(&log_key, &log)?;
            ended = Some(entry);
            Ok(())
        })?;
        let entry = ended.ok_or_else(|| no_context(agent_id))?;

        tracing::info!(agent = %agent_id, outcome = %outcome, "Ended context");
        Ok(entry)
    }

    fn new_context(
        &self,
        project_id: &ProjectId,
        objective: &str,
        priority: Priority,
    ) -> Result<AgentContext> {
        if objective.trim().is_empty() {
            return Err(Error::validation("Context objective cannot be empty"));
        }
        self.projects.ensure_exists(project_id)?;
        Ok(AgentContext {
            project_id: project_id.clone(),
            objective: objective.trim().to_string(),
            priority,
            started_at: self.clock.now(),
        })
    }

    /// Apply `change` to the context state and move the profile to `status`,
    /// both under the agent's guard.
    fn transition(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        change: impl FnOnce(&mut ContextState) -> Result<()>,
    ) -> Result<()> {
        let _guard = self.store.guard(&Self::agent_guard(agent_id))?;
        let mut profile = self.get(agent_id)?;

        let context_key = Self::key(agent_id, CONTEXT_NAME)?;
        let mut state: ContextState = self.store.load(&context_key)?.unwrap_or_default();
        change(&mut state)?;
        self.store.save(&context_key, &state)?;

        profile.status = status;
        profile.last_active = self.clock.now();
        self.store
            .save(&Self::key(agent_id, PROFILE_NAME)?, &profile)
    }
}

fn no_context(agent_id: &AgentId) -> Error {
    Error::validation(format!("Agent '{agent_id}' has no active context to end"))
}
