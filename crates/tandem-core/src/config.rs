//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/tandem/config.toml`
//! 3. Project config: `.tandem/config.toml`
//! 4. Environment variables: `TANDEM_*`
//! 5. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! root = "/var/lib/tandem"
//!
//! [locks]
//! default_duration_minutes = 30
//! max_duration_minutes = 480
//!
//! [memory]
//! change_log_limit = 2000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TandemConfig {
    /// Directory holding every persisted record
    pub root: PathBuf,
    pub locks: LockConfig,
    pub context: ContextConfig,
    pub memory: MemoryConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Duration used when a caller does not name one
    pub default_duration_minutes: i64,
    /// Upper bound on any requested duration
    pub max_duration_minutes: i64,
    /// Period of `tandem lock sweep --watch`
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextConfig {
    /// Archived contexts kept per agent
    pub history_limit: usize,
    /// Closing entries kept per agent
    pub session_log_limit: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Changes kept per project before the oldest are pruned
    pub change_log_limit: usize,
    /// Shorter search tokens are ignored
    pub min_token_length: usize,
    /// Activity events kept per project
    pub activity_limit: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Retries before a busy guard gives up
    pub guard_max_retries: u32,
    /// Base delay for exponential backoff
    pub guard_base_delay_ms: u64,
    /// Cap on a single backoff delay
    pub guard_max_delay_ms: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            locks: LockConfig::default(),
            context: ContextConfig::default(),
            memory: MemoryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 60,
            max_duration_minutes: 24 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            session_log_limit: 200,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            change_log_limit: 1000,
            min_token_length: 3,
            activity_limit: 500,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            guard_max_retries: 10,
            guard_base_delay_ms: 5,
            guard_max_delay_ms: 500,
        }
    }
}

impl TandemConfig {
    /// Defaults rooted at `root`, used by tests and embedders.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::configuration("root cannot be empty"));
        }

        if self.locks.default_duration_minutes <= 0 {
            return Err(Error::configuration(
                "locks.default_duration_minutes must be positive",
            ));
        }

        if self.locks.max_duration_minutes < self.locks.default_duration_minutes {
            return Err(Error::configuration(
                "locks.max_duration_minutes must be >= locks.default_duration_minutes",
            ));
        }

        // chrono::Duration::minutes panics past ~i64::MAX / 60_000
        if self.locks.max_duration_minutes > MAX_LOCK_MINUTES_CEILING {
            return Err(Error::configuration(format!(
                "locks.max_duration_minutes cannot exceed {MAX_LOCK_MINUTES_CEILING}"
            )));
        }

        if self.locks.sweep_interval_secs == 0 {
            return Err(Error::configuration(
                "locks.sweep_interval_secs must be positive",
            ));
        }

        if self.context.history_limit == 0 || self.context.session_log_limit == 0 {
            return Err(Error::configuration("context limits must be positive"));
        }

        if self.memory.change_log_limit == 0 || self.memory.activity_limit == 0 {
            return Err(Error::configuration("memory limits must be positive"));
        }

        if self.memory.min_token_length == 0 {
            return Err(Error::configuration(
                "memory.min_token_length must be at least 1",
            ));
        }

        Ok(())
    }

    /// Apply `TANDEM_*` environment overrides
    fn apply_env_vars(&mut self) -> Result<()> {
        // TANDEM_ROOT
        if let Ok(value) = std::env::var("TANDEM_ROOT") {
            self.root = PathBuf::from(value);
        }

        // TANDEM_LOCK_DEFAULT_MINUTES
        if let Ok(value) = std::env::var("TANDEM_LOCK_DEFAULT_MINUTES") {
            self.locks.default_duration_minutes = value.parse().map_err(|e| {
                Error::configuration(format!("Invalid TANDEM_LOCK_DEFAULT_MINUTES value: {e}"))
            })?;
        }

        // TANDEM_LOCK_MAX_MINUTES
        if let Ok(value) = std::env::var("TANDEM_LOCK_MAX_MINUTES") {
            self.locks.max_duration_minutes = value.parse().map_err(|e| {
                Error::configuration(format!("Invalid TANDEM_LOCK_MAX_MINUTES value: {e}"))
            })?;
        }

        // TANDEM_SWEEP_INTERVAL_SECS
        if let Ok(value) = std::env::var("TANDEM_SWEEP_INTERVAL_SECS") {
            self.locks.sweep_interval_secs = value.parse().map_err(|e| {
                Error::configuration(format!("Invalid TANDEM_SWEEP_INTERVAL_SECS value: {e}"))
            })?;
        }

        // TANDEM_CHANGE_LOG_LIMIT
        if let Ok(value) = std::env::var("TANDEM_CHANGE_LOG_LIMIT") {
            self.memory.change_log_limit = value.parse().map_err(|e| {
                Error::configuration(format!("Invalid TANDEM_CHANGE_LOG_LIMIT value: {e}"))
            })?;
        }

        Ok(())
    }

    fn merge(&mut self, other: PartialConfig) {
        if let Some(root) = other.root {
            self.root = root;
        }
        if let Some(locks) = other.locks {
            self.locks.merge(locks);
        }
        if let Some(context) = other.context {
            self.context.merge(context);
        }
        if let Some(memory) = other.memory {
            self.memory.merge(memory);
        }
        if let Some(store) = other.store {
            self.store.merge(store);
        }
    }
}

/// Largest lock duration the configuration accepts (about 100 years).
pub const MAX_LOCK_MINUTES_CEILING: i64 = 100 * 365 * 24 * 60;

// ═══════════════════════════════════════════════════════════════════════════
// PARTIAL (FILE) CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// A config file where every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    root: Option<PathBuf>,
    locks: Option<PartialLockConfig>,
    context: Option<PartialContextConfig>,
    memory: Option<PartialMemoryConfig>,
    store: Option<PartialStoreConfig>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialLockConfig {
    default_duration_minutes: Option<i64>,
    max_duration_minutes: Option<i64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialContextConfig {
    history_limit: Option<usize>,
    session_log_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialMemoryConfig {
    change_log_limit: Option<usize>,
    min_token_length: Option<usize>,
    activity_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialStoreConfig {
    guard_max_retries: Option<u32>,
    guard_base_delay_ms: Option<u64>,
    guard_max_delay_ms: Option<u64>,
}

impl LockConfig {
    fn merge(&mut self, other: PartialLockConfig) {
        if let Some(v) = other.default_duration_minutes {
            self.default_duration_minutes = v;
        }
        if let Some(v) = other.max_duration_minutes {
            self.max_duration_minutes = v;
        }
        if let Some(v) = other.sweep_interval_secs {
            self.sweep_interval_secs = v;
        }
    }
}

impl ContextConfig {
    fn merge(&mut self, other: PartialContextConfig) {
        if let Some(v) = other.history_limit {
            self.history_limit = v;
        }
        if let Some(v) = other.session_log_limit {
            self.session_log_limit = v;
        }
    }
}

impl MemoryConfig {
    fn merge(&mut self, other: PartialMemoryConfig) {
        if let Some(v) = other.change_log_limit {
            self.change_log_limit = v;
        }
        if let Some(v) = other.min_token_length {
            self.min_token_length = v;
        }
        if let Some(v) = other.activity_limit {
            self.activity_limit = v;
        }
    }
}

impl StoreConfig {
    fn merge(&mut self, other: PartialStoreConfig) {
        if let Some(v) = other.guard_max_retries {
            self.guard_max_retries = v;
        }
        if let Some(v) = other.guard_base_delay_ms {
            self.guard_base_delay_ms = v;
        }
        if let Some(v) = other.guard_max_delay_ms {
            self.guard_max_delay_ms = v;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from the standard locations
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML or has unknown keys
/// - An environment override does not parse
/// - The merged values fail validation
pub fn load_config() -> Result<TandemConfig> {
    let global = global_config_path();
    let project = project_config_path();
    load_config_from(global.as_deref(), project.as_deref())
}

/// Load configuration from explicit file locations
///
/// Missing files are skipped; environment overrides still apply.
pub fn load_config_from(global: Option<&Path>, project: Option<&Path>) -> Result<TandemConfig> {
    // 1. Start with built-in defaults
    let mut config = TandemConfig::default();

    // 2. Global config, then 3. project config (project overrides global)
    for path in [global, project].into_iter().flatten() {
        if path.exists() {
            let partial = load_toml_file(path)?;
            config.merge(partial);
            tracing::debug!(path = %path.display(), "Merged config file");
        }
    }

    // 4. Apply environment variable overrides
    config.apply_env_vars()?;

    // 5. Validate
    config.validate()?;

    Ok(config)
}

/// Get path to global config file
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tandem")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(".tandem").join("config.toml"))
}

/// Default data directory: the platform data dir, or `.tandem/data` as a fallback
fn default_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "tandem").map_or_else(
        || PathBuf::from(".tandem").join("data"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Load a TOML file into a partial config
fn load_toml_file(path: &Path) -> Result<PartialConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::configuration(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::configuration(format!("Failed to parse config: {}: {e}", path.display()))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
