//! File locks: time-bounded exclusive claims on one path within one project.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{migrate::Versioned, models::AgentId, Error, Result};

/// A lock on a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Normalised project-relative path
    pub file: String,
    /// Lock holder
    pub agent_id: AgentId,
    pub reason: String,
    /// When acquired
    pub locked_at: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Lock timeout
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Create a new lock
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the expiry overflows the representable range.
    pub fn new(
        file: String,
        agent_id: AgentId,
        reason: String,
        locked_at: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<Self> {
        let expires_at = Duration::try_minutes(duration_minutes)
            .and_then(|d| locked_at.checked_add_signed(d))
            .ok_or_else(|| {
                Error::validation(format!("Lock duration {duration_minutes}m is out of range"))
            })?;
        Ok(Self {
            file,
            agent_id,
            reason,
            locked_at,
            duration_minutes,
            expires_at,
        })
    }

    /// A lock is expired once `now` reaches its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Every lock in one project, keyed by file path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTable {
    #[serde(default)]
    pub locks: BTreeMap<String, LockRecord>,
}

impl LockTable {
    /// Remove and return every expired lock.
    pub fn reclaim_expired(&mut self, now: DateTime<Utc>) -> Vec<LockRecord> {
        let expired: Vec<String> = self
            .locks
            .values()
            .filter(|l| l.is_expired(now))
            .map(|l| l.file.clone())
            .collect();
        expired
            .iter()
            .filter_map(|file| self.locks.remove(file))
            .collect()
    }

    /// The non-expired lock on `file`, if any
    #[must_use]
    pub fn active(&self, file: &str, now: DateTime<Utc>) -> Option<&LockRecord> {
        self.locks.get(file).filter(|l| !l.is_expired(now))
    }

    /// Every non-expired lock, ordered by file
    #[must_use]
    pub fn active_locks(&self, now: DateTime<Utc>) -> Vec<LockRecord> {
        self.locks
            .values()
            .filter(|l| !l.is_expired(now))
            .cloned()
            .collect()
    }
}

impl Versioned for LockTable {
    const KIND: &'static str = "lock_table";
}
