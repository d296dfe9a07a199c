//! Common test utilities and relaxed clippy settings for tandem-core integration tests

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    // Test code ergonomics
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args,
)]

use std::sync::Arc;

use tandem_core::{
    models::{AgentId, ProjectId},
    Coordinator, ManualClock, TandemConfig,
};
use tempfile::TempDir;

/// A coordinator over a throwaway store, driven by a manual clock
pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub coordinator: Coordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build with adjusted configuration
    pub fn with_config(adjust: impl FnOnce(&mut TandemConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = TandemConfig::with_root(dir.path().join("data"));
        adjust(&mut config);
        let clock = Arc::new(ManualClock::starting_now());
        let coordinator = Coordinator::with_clock(&config, clock.clone()).unwrap();
        Self {
            dir,
            clock,
            coordinator,
        }
    }

    /// Another coordinator over the same root, as a second process would open it
    pub fn reopen(&self) -> Coordinator {
        Coordinator::with_clock(self.coordinator.config(), self.clock.clone()).unwrap()
    }

    pub fn project(&self, name: &str) -> ProjectId {
        self.coordinator
            .init_project(&self.dir.path().join("workspaces").join(name), None, None)
            .unwrap()
            .project
            .id
    }

    pub fn agent(&self, name: &str) -> AgentId {
        self.coordinator
            .register_agent(name, "test", &[])
            .unwrap()
            .agent_id
    }
}

pub fn files(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}
