//! # Tandem Core
//!
//! Coordination engine for multiple agents editing files in shared projects.
//!
//! - Agent identity across sessions, with a context lifecycle per agent
//! - Time-bounded, all-or-nothing file locks with stale-lock reclamation
//! - Durable project memory: decisions with a search index, a bounded change
//!   log, and symmetric file dependency metadata
//!
//! Everything persists as JSON records on the local filesystem, written with
//! a temp-file-then-rename primitive and serialised across processes with
//! advisory file guards.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod activity;
pub mod agents;
pub mod clock;
pub mod config;
pub mod coordinator;
mod error;
pub mod index;
pub mod locks;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod projects;
pub mod store;

pub use agents::{AgentRegistry, AgentSelector, Registration, Switched};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, load_config_from, TandemConfig};
pub use coordinator::{Coordinator, SweepReport};
pub use error::{Error, LockConflict, Result};
pub use index::{DecisionIndex, DecisionQuery};
pub use locks::{Acquired, FileLockTracker, Released};
pub use memory::{ChangeQuery, FileMetadataUpdate, ProjectMemory, SearchHit};
pub use projects::{Discovered, ProjectRegistry, ProjectSelector};
pub use store::{Fingerprint, KeyPrefix, RecordKey, RecordKind, Store, StoreGuard};
