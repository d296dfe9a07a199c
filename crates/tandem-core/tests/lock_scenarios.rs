//! End-to-end file lock behaviour through the coordinator.

mod common;

use std::{sync::Barrier, thread};

use chrono::Duration;
use common::{files, Harness};
use tandem_core::{models::Priority, Error};

#[test]
fn all_or_nothing_conflict_reports_owner() {
    let h = Harness::new();
    let project = h.project("app");
    let a1 = h.agent("A1");
    let a2 = h.agent("A2");

    h.coordinator
        .acquire_locks(&a1, &project, &files(&["src/x.py"]), "refactor", Some(60))
        .unwrap();

    let err = h
        .coordinator
        .acquire_locks(&a2, &project, &files(&["src/x.py", "src/y.py"]), "feature", Some(60))
        .unwrap_err();

    let conflicts = err.conflicts().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].file, "src/x.py");
    assert_eq!(conflicts[0].owner, a1.as_str());
    assert_eq!(conflicts[0].reason, "refactor");

    // Nothing from the failed batch was committed
    assert!(h.coordinator.lock_status(&project, "src/y.py").unwrap().is_none());
    let held = h.coordinator.query_locks(&project).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].agent_id, a1);
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn lock_visible_until_expiry_then_reacquirable() {
    let h = Harness::new();
    let project = h.project("app");
    let a1 = h.agent("A1");
    let a2 = h.agent("A2");

    h.coordinator
        .acquire_locks(&a1, &project, &files(&["lib.rs"]), "edit", Some(30))
        .unwrap();

    h.clock.advance(Duration::minutes(30) - Duration::seconds(1));
    assert_eq!(h.coordinator.query_locks(&project).unwrap().len(), 1);
    assert!(matches!(
        h.coordinator
            .acquire_locks(&a2, &project, &files(&["lib.rs"]), "edit", Some(5)),
        Err(Error::LockConflict { .. })
    ));

    h.clock.advance(Duration::seconds(1));
    assert!(h.coordinator.query_locks(&project).unwrap().is_empty());

    let reclaimed = h.coordinator.reclaim_stale(&project).unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert!(h.coordinator.reclaim_stale(&project).unwrap().is_empty());

    let acquired = h
        .coordinator
        .acquire_locks(&a2, &project, &files(&["lib.rs"]), "edit", Some(5))
        .unwrap();
    assert_eq!(acquired.acquired[0].agent_id, a2);
}

#[test]
fn default_duration_comes_from_config() {
    let h = Harness::with_config(|c| c.locks.default_duration_minutes = 15);
    let project = h.project("app");
    let a1 = h.agent("A1");

    let out = h
        .coordinator
        .acquire_locks(&a1, &project, &files(&["a"]), "r", None)
        .unwrap();
    assert_eq!(out.acquired[0].duration_minutes, 15);
    assert_eq!(
        out.acquired[0].expires_at - out.acquired[0].locked_at,
        Duration::minutes(15)
    );
}

#[test]
fn unregistered_agent_cannot_lock() {
    let h = Harness::new();
    let project = h.project("app");
    assert!(matches!(
        h.coordinator
            .acquire_locks(&"ghost".into(), &project, &files(&["a"]), "r", Some(5)),
        Err(Error::AgentNotFound(_))
    ));
}

#[test]
fn context_switch_keeps_locks() {
    let h = Harness::new();
    let one = h.project("one");
    let two = h.project("two");
    let a1 = h.agent("A1");

    h.coordinator
        .start_context(&a1, &one, "build feature", Priority::High)
        .unwrap();
    h.coordinator
        .acquire_locks(&a1, &one, &files(&["src/main.rs"]), "feature", Some(60))
        .unwrap();
    h.coordinator
        .switch_context(&a1, &two, "fix bug", Priority::Normal)
        .unwrap();

    let held = h.coordinator.query_locks(&one).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].agent_id, a1);
}

#[test]
fn second_process_sees_and_respects_locks() {
    let h = Harness::new();
    let project = h.project("app");
    let a1 = h.agent("A1");
    let a2 = h.agent("A2");

    h.coordinator
        .acquire_locks(&a1, &project, &files(&["shared.rs"]), "r", Some(10))
        .unwrap();

    let other = h.reopen();
    assert!(matches!(
        other.acquire_locks(&a2, &project, &files(&["shared.rs"]), "r", Some(10)),
        Err(Error::LockConflict { .. })
    ));
    assert_eq!(other.query_locks(&project).unwrap().len(), 1);
}

#[test]
fn concurrent_acquirers_have_one_winner() {
    const CONTENDERS: usize = 8;

    let h = Harness::with_config(|c| c.store.guard_max_retries = 30);
    let project = h.project("app");
    let agents: Vec<_> = (0..CONTENDERS).map(|i| h.agent(&format!("agent-{i}"))).collect();
    let barrier = Barrier::new(CONTENDERS);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = agents
            .iter()
            .map(|agent| {
                let coordinator = h.reopen();
                let project = project.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    coordinator.acquire_locks(agent, &project, &files(&["hot.rs"]), "race", Some(10))
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::LockConflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, CONTENDERS - 1);
    assert_eq!(h.coordinator.query_locks(&project).unwrap().len(), 1);
}

#[test]
fn sweep_reports_only_projects_with_stale_locks() {
    let h = Harness::new();
    let one = h.project("one");
    let two = h.project("two");
    let a1 = h.agent("A1");

    h.coordinator
        .acquire_locks(&a1, &one, &files(&["a"]), "short", Some(1))
        .unwrap();
    h.coordinator
        .acquire_locks(&a1, &two, &files(&["b"]), "long", Some(120))
        .unwrap();
    h.clock.advance(Duration::minutes(2));

    let reports = h.coordinator.sweep_all().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].project_id, one);
    assert_eq!(reports[0].reclaimed[0].file, "a");
    assert!(h.coordinator.sweep_all().unwrap().is_empty());
}

#[test]
fn activity_journal_records_lock_lifecycle() {
    let h = Harness::new();
    let project = h.project("app");
    let a1 = h.agent("A1");

    h.coordinator
        .acquire_locks(&a1, &project, &files(&["a"]), "r", Some(5))
        .unwrap();
    h.coordinator
        .release_locks(&a1, &project, &files(&["a"]))
        .unwrap();

    let kinds: Vec<_> = h
        .coordinator
        .recent_activity(&project, 10)
        .unwrap()
        .into_iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert_eq!(kinds, vec!["lock_released", "lock_acquired"]);
}
