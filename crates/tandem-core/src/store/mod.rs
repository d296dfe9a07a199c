//! Persistent store: namespaced key → record storage with torn-write-free saves.
//!
//! Records live at `<root>/<kind>/<scope>/<name>.json`, each wrapped in a
//! versioned envelope. Writes go to a temporary file in the destination
//! directory, are flushed, and then renamed over the destination, so a reader
//! sees either the complete old record or the complete new one.
//!
//! The store performs no implicit mutual exclusion. Callers that need a
//! read-check-write sequence to be exclusive take a [`StoreGuard`] for a
//! scope, or use [`Store::save_if`] to commit only over an expected prior
//! fingerprint.

mod guard;
mod key;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use guard::{GuardOptions, StoreGuard};
pub use key::{KeyPrefix, RecordKey, RecordKind};

use crate::{
    config::StoreConfig,
    migrate::{self, Versioned},
    Error, Result,
};

/// Prefix of in-flight temporary files
const TEMP_PREFIX: &str = ".tmp-";

/// Temporary files older than this are treated as crash leftovers
const ORPHAN_AGE: Duration = Duration::from_secs(60);

/// Per-process sequence for unique temporary names
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// SHA-256 of a record's bytes on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    schema_version: u32,
    kind: &'a str,
    written_at: DateTime<Utc>,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    schema_version: u32,
    kind: String,
    data: Value,
}

/// Filesystem-backed record store.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    guard_options: GuardOptions,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Verifies the root is a writable directory and removes temporary files
    /// abandoned by writers that crashed before renaming.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the root cannot be created or written.
    pub fn open(root: impl Into<PathBuf>, config: &StoreConfig) -> Result<Self> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|e| {
            Error::configuration(format!(
                "Cannot create store root '{}': {e}",
                root.display()
            ))
        })?;

        if !root.is_dir() {
            return Err(Error::configuration(format!(
                "Store root '{}' is not a directory",
                root.display()
            )));
        }

        let probe = root.join(format!("{TEMP_PREFIX}probe-{}", std::process::id()));
        fs::write(&probe, b"probe")
            .and_then(|()| fs::remove_file(&probe))
            .map_err(|e| {
                Error::configuration(format!(
                    "Store root '{}' is not writable: {e}",
                    root.display()
                ))
            })?;

        let store = Self {
            root,
            guard_options: GuardOptions::from(config),
        };
        let removed = store.remove_orphans(ORPHAN_AGE);
        if removed > 0 {
            tracing::warn!(removed, root = %store.root.display(), "Removed orphaned temporary files");
        }

        tracing::debug!(root = %store.root.display(), "Opened store");
        Ok(store)
    }

    /// Store root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically write `record` under `key`.
    pub fn save<T: Versioned>(&self, key: &RecordKey, record: &T) -> Result<()> {
        let bytes = encode(key, record)?;
        self.write_atomic(key, &bytes)?;
        tracing::debug!(key = %key, bytes = bytes.len(), "Saved record");
        Ok(())
    }

    /// Load the record under `key`, migrating it if it is an older schema.
    ///
    /// # Errors
    ///
    /// Returns `DataCorruption` if the bytes do not parse as a `T` envelope.
    pub fn load<T: Versioned>(&self, key: &RecordKey) -> Result<Option<T>> {
        self.load_with_fingerprint(key)
            .map(|found| found.map(|(record, _)| record))
    }

    /// Load a record along with the fingerprint of its current bytes.
    pub fn load_with_fingerprint<T: Versioned>(
        &self,
        key: &RecordKey,
    ) -> Result<Option<(T, Fingerprint)>> {
        self.load_migrating(key, true)
    }

    /// Load and migrate, re-reading once if the write-back loses a race.
    fn load_migrating<T: Versioned>(
        &self,
        key: &RecordKey,
        retry: bool,
    ) -> Result<Option<(T, Fingerprint)>> {
        let Some(bytes) = self.read_bytes(key)? else {
            return Ok(None);
        };
        let fingerprint = Fingerprint::of(&bytes);

        let envelope: EnvelopeIn = serde_json::from_slice(&bytes).map_err(|e| corrupt(key, e))?;
        if envelope.kind != T::KIND {
            return Err(corrupt(
                key,
                format!("expected a '{}' record, found '{}'", T::KIND, envelope.kind),
            ));
        }

        let stale = envelope.schema_version < T::SCHEMA_VERSION;
        let payload = migrate::upgrade::<T>(envelope.schema_version, envelope.data)
            .map_err(|e| corrupt(key, e))?;
        let record: T = serde_json::from_value(payload).map_err(|e| corrupt(key, e))?;

        if !stale {
            return Ok(Some((record, fingerprint)));
        }

        tracing::warn!(
            key = %key,
            from = envelope.schema_version,
            to = T::SCHEMA_VERSION,
            "Migrated record on load"
        );
        match self.save_if(key, &record, Some(&fingerprint)) {
            Ok(new_fingerprint) => Ok(Some((record, new_fingerprint))),
            Err(Error::WriteConflict { .. }) if retry => {
                // A concurrent writer replaced the old record; read theirs.
                self.load_migrating(key, false)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to persist migrated record");
                Ok(Some((record, fingerprint)))
            }
        }
    }

    /// Atomically write `record` only if the key still holds `expected`.
    ///
    /// `expected = None` means the key must not exist yet. Conditional saves
    /// are serialised against each other through a per-key guard.
    ///
    /// Limits:
    /// - A plain [`Store::save`] does not take the per-key guard. It is caught
    ///   when it lands before the fingerprint check, not when it lands between
    ///   that check and the rename. Writers that mix both must share a
    ///   component guard.
    /// - Each key ever saved conditionally leaves a guard file under
    ///   `.guards/`. Guard files are never removed while another process
    ///   may be waiting on them.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` if the current bytes do not match.
    pub fn save_if<T: Versioned>(
        &self,
        key: &RecordKey,
        record: &T,
        expected: Option<&Fingerprint>,
    ) -> Result<Fingerprint> {
        let scope = format!("key.{}", Fingerprint::of(key.to_string().as_bytes()));
        let _guard = self.guard(&scope)?;

        let current = self.read_bytes(key)?.map(|b| Fingerprint::of(&b));
        if current.as_ref() != expected {
            return Err(Error::WriteConflict {
                key: key.to_string(),
            });
        }

        let bytes = encode(key, record)?;
        self.write_atomic(key, &bytes)?;
        tracing::debug!(key = %key, "Saved record conditionally");
        Ok(Fingerprint::of(&bytes))
    }

    /// Remove the record under `key`. Returns whether it existed.
    pub fn delete(&self, key: &RecordKey) -> Result<bool> {
        match fs::remove_file(key.path(&self.root)) {
            Ok(()) => {
                tracing::debug!(key = %key, "Deleted record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(format!("Failed to delete '{key}'"), &e)),
        }
    }

    /// Whether a committed record exists under `key`.
    #[must_use]
    pub fn exists(&self, key: &RecordKey) -> bool {
        key.path(&self.root).is_file()
    }

    /// List committed keys under a prefix, sorted.
    pub fn list_keys(&self, prefix: &KeyPrefix) -> Result<Vec<RecordKey>> {
        let kind_dir = self.root.join(prefix.kind.to_string());
        let scopes = match &prefix.scope {
            Some(scope) => vec![scope.clone()],
            None => list_dir_names(&kind_dir, |path| path.is_dir())?,
        };

        let mut keys = Vec::new();
        for scope in scopes {
            let files = list_dir_names(&kind_dir.join(&scope), |path| path.is_file())?;
            for file in files {
                let Some(name) = file.strip_suffix(&format!(".{}", key::RECORD_EXTENSION)) else {
                    continue;
                };
                if let Ok(key) = RecordKey::new(prefix.kind, scope.clone(), name) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Take the exclusive advisory guard for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `Contention` if another holder keeps it past the retry budget.
    pub fn guard(&self, scope: &str) -> Result<StoreGuard> {
        guard::acquire(&self.root, scope, &self.guard_options)
    }

    fn read_bytes(&self, key: &RecordKey) -> Result<Option<Vec<u8>>> {
        match fs::read(key.path(&self.root)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!("Failed to read '{key}'"), &e)),
        }
    }

    fn write_atomic(&self, key: &RecordKey, bytes: &[u8]) -> Result<()> {
        let dir = key.dir(&self.root);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("Failed to create '{}'", dir.display()), &e))?;

        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(
            "{TEMP_PREFIX}{}-{seq}-{}",
            std::process::id(),
            key.name()
        ));

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(format!("Failed to write '{key}'"), &e));
        }

        if let Err(e) = fs::rename(&tmp, key.path(&self.root)) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(format!("Failed to commit '{key}'"), &e));
        }

        // Durability of the rename itself; not every platform can open a directory.
        if let Ok(dir_handle) = fs::File::open(&dir) {
            let _ = dir_handle.sync_all();
        }

        Ok(())
    }

    /// Remove temporary files older than `min_age` from every record directory.
    fn remove_orphans(&self, min_age: Duration) -> usize {
        let Ok(kinds) = fs::read_dir(&self.root) else {
            return 0;
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for scope_dir in kinds
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|kind_dir| fs::read_dir(kind_dir).ok())
            .flat_map(|scopes| scopes.flatten().map(|entry| entry.path()))
            .filter(|path| path.is_dir())
        {
            let Ok(entries) = fs::read_dir(&scope_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let is_temp = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
                let old_enough = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age >= min_age);
                if is_temp && old_enough && fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

fn encode<T: Versioned>(key: &RecordKey, record: &T) -> Result<Vec<u8>> {
    let envelope = EnvelopeOut {
        schema_version: T::SCHEMA_VERSION,
        kind: T::KIND,
        written_at: Utc::now(),
        data: record,
    };
    serde_json::to_vec_pretty(&envelope)
        .map_err(|e| Error::validation(format!("Failed to serialize '{key}': {e}")))
}

fn corrupt(key: &RecordKey, reason: impl std::fmt::Display) -> Error {
    Error::DataCorruption {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Names of directory entries matching `keep`, skipping hidden and temporary files.
fn list_dir_names(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(format!("Failed to list '{}'", dir.display()), &e)),
    };

    Ok(entries
        .flatten()
        .filter(|entry| keep(&entry.path()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect())
}
