//! Property-based tests for lock table invariants using proptest.
//!
//! Invariants tested:
//! - A batch either locks every requested file or none of them
//! - A file is never held by two agents
//! - Only the owner can release a lock

#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod common;

use std::collections::BTreeMap;

use common::Harness;
use proptest::prelude::*;
use tandem_core::{models::AgentId, Error};

/// Few cases: every case builds a fresh store on disk.
fn lock_config() -> ProptestConfig {
    ProptestConfig {
        cases: 24,
        max_shrink_iters: 64,
        ..ProptestConfig::default()
    }
}

const FILES: [&str; 4] = ["a.rs", "b.rs", "c.rs", "d.rs"];

#[derive(Debug, Clone)]
enum Op {
    Acquire { agent: usize, files: Vec<usize> },
    Release { agent: usize, files: Vec<usize> },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let batch = prop::collection::vec(0..FILES.len(), 1..=3);
    prop_oneof![
        (0..3_usize, batch.clone()).prop_map(|(agent, files)| Op::Acquire { agent, files }),
        (0..3_usize, batch).prop_map(|(agent, files)| Op::Release { agent, files }),
    ]
}

fn names(indices: &[usize]) -> Vec<String> {
    indices.iter().map(|i| FILES[*i].to_string()).collect()
}

proptest! {
    #![proptest_config(lock_config())]

    #[test]
    fn lock_table_matches_model(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let h = Harness::new();
        let project = h.project("prop");
        let agents: Vec<AgentId> = (0..3).map(|i| h.agent(&format!("agent-{i}"))).collect();
        let mut model: BTreeMap<String, usize> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Acquire { agent, files } => {
                    let requested = names(&files);
                    let blocked = requested
                        .iter()
                        .any(|f| model.get(f).is_some_and(|owner| *owner != agent));
                    let result = h.coordinator.acquire_locks(
                        &agents[agent], &project, &requested, "prop", Some(30),
                    );
                    if blocked {
                        let is_conflict = matches!(result, Err(Error::LockConflict { .. }));
                        prop_assert!(is_conflict);
                    } else {
                        prop_assert!(result.is_ok());
                        for f in requested {
                            model.insert(f, agent);
                        }
                    }
                }
                Op::Release { agent, files } => {
                    let requested = names(&files);
                    let foreign = requested
                        .iter()
                        .any(|f| model.get(f).is_some_and(|owner| *owner != agent));
                    let result = h.coordinator.release_locks(&agents[agent], &project, &requested);
                    if foreign {
                        let is_denied = matches!(result, Err(Error::LockAuthorization { .. }));
                        prop_assert!(is_denied);
                    } else {
                        prop_assert!(result.is_ok());
                        for f in &requested {
                            model.remove(f);
                        }
                    }
                }
            }

            let actual: BTreeMap<String, AgentId> = h
                .coordinator
                .query_locks(&project)
                .unwrap()
                .into_iter()
                .map(|l| (l.file, l.agent_id))
                .collect();
            let expected: BTreeMap<String, AgentId> = model
                .iter()
                .map(|(f, a)| (f.clone(), agents[*a].clone()))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
