//! Project registry: one project per absolute workspace path.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use crate::{
    clock::Clock,
    models::{ProjectId, ProjectInfo, ProjectPathIndex},
    store::{KeyPrefix, RecordKey, RecordKind, Store},
    Error, Result,
};

const INFO_NAME: &str = "info";
const REGISTRY_SCOPE: &str = "projects";
const PATH_INDEX_NAME: &str = "paths";
const GUARD_SCOPE: &str = "registry.projects";

/// Identifies a project by id, name or workspace path.
///
/// When several are set, id wins over path, and path over name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSelector {
    pub id: Option<ProjectId>,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}

impl ProjectSelector {
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(ProjectId::new(id)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Result of [`ProjectRegistry::discover`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Discovered {
    pub project: ProjectInfo,
    /// False when the path was already registered
    pub created: bool,
}

/// Creates, finds and updates projects
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl ProjectRegistry {
    #[must_use]
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn info_key(id: &ProjectId) -> Result<RecordKey> {
        RecordKey::new(RecordKind::Projects, id.as_str(), INFO_NAME)
    }

    fn path_index_key() -> Result<RecordKey> {
        RecordKey::new(RecordKind::Registry, REGISTRY_SCOPE, PATH_INDEX_NAME)
    }

    /// Return the project registered for `path`, creating it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `path` is not absolute.
    pub fn discover(
        &self,
        path: &Path,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Discovered> {
        let path = normalize_workspace(path)?;
        let path_key = path.to_string_lossy().into_owned();

        let _guard = self.store.guard(GUARD_SCOPE)?;
        let index_key = Self::path_index_key()?;
        let mut index: ProjectPathIndex = self.store.load(&index_key)?.unwrap_or_default();

        if let Some(id) = index.by_path.get(&path_key) {
            if let Some(project) = self.store.load::<ProjectInfo>(&Self::info_key(id)?)? {
                return Ok(Discovered {
                    project,
                    created: false,
                });
            }
            tracing::warn!(project = %id, path = %path_key, "Path index points at a missing project, re-registering");
        }

        let now = self.clock.now();
        let default_name = path
            .file_name()
            .map_or_else(|| path_key.clone(), |n| n.to_string_lossy().into_owned());
        let project = ProjectInfo {
            id: ProjectId::generate(),
            name: name.map_or(default_name, String::from),
            path,
            description: description.map(String::from),
            created_at: now,
            updated_at: now,
        };
        if project.name.trim().is_empty() {
            return Err(Error::validation("Project name cannot be empty"));
        }

        self.store.save(&Self::info_key(&project.id)?, &project)?;
        index.by_path.insert(path_key, project.id.clone());
        self.store.save(&index_key, &index)?;

        tracing::info!(project = %project.id, name = %project.name, "Registered project");
        Ok(Discovered {
            project,
            created: true,
        })
    }

    /// Load a project.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if no project has this id.
    pub fn get(&self, id: &ProjectId) -> Result<ProjectInfo> {
        let key = RecordKey::new(RecordKind::Projects, id.as_str(), INFO_NAME)
            .map_err(|_| Error::ProjectNotFound(id.to_string()))?;
        self.store
            .load(&key)?
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))
    }

    /// Fail with `ProjectNotFound` unless the project exists.
    pub fn ensure_exists(&self, id: &ProjectId) -> Result<()> {
        self.get(id).map(|_| ())
    }

    /// Every project, ordered by name.
    pub fn list(&self) -> Result<Vec<ProjectInfo>> {
        let mut projects = Vec::new();
        for key in self.store.list_keys(&KeyPrefix::kind(RecordKind::Projects))? {
            if key.name() != INFO_NAME {
                continue;
            }
            if let Some(project) = self.store.load::<ProjectInfo>(&key)? {
                projects.push(project);
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    /// Change a project's name or description.
    pub fn update(
        &self,
        id: &ProjectId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ProjectInfo> {
        let _guard = self.store.guard(GUARD_SCOPE)?;
        let mut project = self.get(id)?;
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(Error::validation("Project name cannot be empty"));
            }
            project.name = name.to_string();
        }
        if let Some(description) = description {
            project.description = Some(description.to_string());
        }
        project.updated_at = self.clock.now();
        self.store.save(&Self::info_key(id)?, &project)?;
        tracing::info!(project = %id, "Updated project");
        Ok(project)
    }

    /// Resolve a selector to exactly one project id.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` on no match, `Validation` for an empty selector
    /// or a name shared by several projects.
    pub fn resolve(&self, selector: &ProjectSelector) -> Result<ProjectId> {
        if let Some(id) = &selector.id {
            return self.get(id).map(|p| p.id);
        }

        if let Some(path) = &selector.path {
            let path = normalize_workspace(path)?;
            let index: ProjectPathIndex = self
                .store
                .load(&Self::path_index_key()?)?
                .unwrap_or_default();
            return index
                .by_path
                .get(&*path.to_string_lossy())
                .cloned()
                .ok_or_else(|| Error::ProjectNotFound(path.display().to_string()));
        }

        if let Some(name) = &selector.name {
            let matches: Vec<ProjectId> = self
                .list()?
                .into_iter()
                .filter(|p| &p.name == name)
                .map(|p| p.id)
                .collect();
            return match matches.as_slice() {
                [] => Err(Error::ProjectNotFound(name.clone())),
                [id] => Ok(id.clone()),
                _ => Err(Error::validation(format!(
                    "Project name '{name}' is ambiguous; select by id or path"
                ))),
            };
        }

        Err(Error::validation("Project selector needs an id, name or path"))
    }
}

/// Absolute path with `.` and `..` resolved lexically and trailing separators removed
fn normalize_workspace(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(Error::validation(format!(
            "Workspace path must be absolute: '{}'",
            path.display()
        )));
    }
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, config::StoreConfig};
    use tempfile::TempDir;

    fn registry() -> (TempDir, ProjectRegistry) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data"), &StoreConfig::default()).unwrap());
        let clock = Arc::new(ManualClock::starting_now());
        (dir, ProjectRegistry::new(store, clock))
    }

    #[test]
    fn test_discover_is_idempotent_per_path() {
        let (dir, registry) = registry();
        let ws = dir.path().join("workspace");

        let first = registry.discover(&ws, None, None).unwrap();
        assert!(first.created);
        assert_eq!(first.project.name, "workspace");

        let trailing = PathBuf::from(format!("{}/./", ws.display()));
        let second = registry.discover(&trailing, Some("ignored"), None).unwrap();
        assert!(!second.created);
        assert_eq!(second.project.id, first.project.id);
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_parent_segments_resolve_to_one_project() {
        let (dir, registry) = registry();
        let ws = dir.path().join("ws");

        let first = registry.discover(&ws.join("b"), None, None).unwrap();
        let detour = registry.discover(&ws.join("a").join("..").join("b"), None, None).unwrap();
        assert!(!detour.created);
        assert_eq!(detour.project.id, first.project.id);
        assert_eq!(
            registry
                .resolve(&ProjectSelector::path(ws.join("b").join("c").join("..")))
                .unwrap(),
            first.project.id
        );

        assert_eq!(
            normalize_workspace(Path::new("/../x/./y/")).unwrap(),
            PathBuf::from("/x/y")
        );
    }

    #[test]
    fn test_relative_path_rejected() {
        let (_dir, registry) = registry();
        assert!(matches!(
            registry.discover(Path::new("relative/ws"), None, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_by_each_selector() {
        let (dir, registry) = registry();
        let a = registry
            .discover(&dir.path().join("a"), Some("alpha"), None)
            .unwrap()
            .project;
        registry
            .discover(&dir.path().join("b"), Some("beta"), None)
            .unwrap();

        assert_eq!(registry.resolve(&ProjectSelector::id(a.id.as_str())).unwrap(), a.id);
        assert_eq!(registry.resolve(&ProjectSelector::name("alpha")).unwrap(), a.id);
        assert_eq!(registry.resolve(&ProjectSelector::path(dir.path().join("a"))).unwrap(), a.id);

        assert!(matches!(
            registry.resolve(&ProjectSelector::name("gamma")),
            Err(Error::ProjectNotFound(_))
        ));
        assert!(matches!(
            registry.resolve(&ProjectSelector::id("nope")),
            Err(Error::ProjectNotFound(_))
        ));
        assert!(matches!(
            registry.resolve(&ProjectSelector::default()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_ambiguous_name() {
        let (dir, registry) = registry();
        registry.discover(&dir.path().join("x"), Some("same"), None).unwrap();
        registry.discover(&dir.path().join("y"), Some("same"), None).unwrap();
        assert!(matches!(
            registry.resolve(&ProjectSelector::name("same")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_update_changes_description() {
        let (dir, registry) = registry();
        let p = registry.discover(&dir.path().join("ws"), None, None).unwrap().project;
        let updated = registry.update(&p.id, None, Some("monorepo")).unwrap();
        assert_eq!(updated.description.as_deref(), Some("monorepo"));
        assert_eq!(registry.get(&p.id).unwrap(), updated);
        assert!(registry.update(&p.id, Some("  "), None).is_err());
    }
}
