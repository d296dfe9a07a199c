//! Agent reconnection and context restoration across sessions.

mod common;

use common::Harness;
use tandem_core::{
    models::{AgentStatus, Outcome, Priority},
    AgentSelector, Error,
};

#[test]
fn reconnect_returns_same_id_and_restores_context() {
    let h = Harness::new();
    let project = h.project("app");

    let first = h
        .coordinator
        .register_agent("planner", "llm", &["plan".to_string()])
        .unwrap();
    assert!(!first.reconnected);
    assert!(first.restored_context.is_none());

    let context = h
        .coordinator
        .start_context(&first.agent_id, &project, "design the api", Priority::High)
        .unwrap();

    // Process restarts: a fresh coordinator over the same root
    let restarted = h.reopen();
    let second = restarted.register_agent("planner", "llm", &[]).unwrap();
    assert!(second.reconnected);
    assert_eq!(second.agent_id, first.agent_id);
    assert_eq!(second.restored_context, Some(context));
    assert_eq!(second.profile.session_count, 2);
    assert_eq!(restarted.agents().list().unwrap().len(), 1);
}

#[test]
fn reconnect_after_end_restores_last_archived_context() {
    let h = Harness::new();
    let project = h.project("app");
    let agent = h.agent("worker");

    let context = h
        .coordinator
        .start_context(&agent, &project, "write tests", Priority::Normal)
        .unwrap();
    let entry = h
        .coordinator
        .end_context(&agent, "tests written", Outcome::Completed)
        .unwrap();
    assert_eq!(entry.objective, "write tests");
    assert_eq!(
        h.coordinator.agents().get(&agent).unwrap().status,
        AgentStatus::Paused
    );

    let again = h.coordinator.register_agent("worker", "test", &[]).unwrap();
    assert_eq!(again.agent_id, agent);
    assert_eq!(again.restored_context, Some(context));
}

#[test]
fn history_is_bounded_and_newest_first() {
    let h = Harness::with_config(|c| c.context.history_limit = 3);
    let project = h.project("app");
    let agent = h.agent("worker");

    h.coordinator
        .start_context(&agent, &project, "task-0", Priority::Low)
        .unwrap();
    for i in 1..6 {
        h.coordinator
            .switch_context(&agent, &project, &format!("task-{i}"), Priority::Low)
            .unwrap();
    }

    let state = h.coordinator.agents().context_state(&agent).unwrap();
    assert_eq!(state.current.unwrap().objective, "task-5");
    let history: Vec<_> = state
        .history
        .iter()
        .map(|a| a.context.objective.as_str())
        .collect();
    assert_eq!(history, vec!["task-4", "task-3", "task-2"]);
}

#[test]
fn ending_twice_fails_validation() {
    let h = Harness::new();
    let project = h.project("app");
    let agent = h.agent("worker");

    h.coordinator
        .start_context(&agent, &project, "one thing", Priority::Normal)
        .unwrap();
    h.coordinator
        .end_context(&agent, "done", Outcome::Partial)
        .unwrap();
    let err = h
        .coordinator
        .end_context(&agent, "again", Outcome::Partial)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(h.coordinator.agents().session_log(&agent).unwrap().len(), 1);
}

#[test]
fn resolve_by_name_or_id() {
    let h = Harness::new();
    let agent = h.agent("reviewer");
    assert_eq!(
        h.coordinator
            .resolve_agent(&AgentSelector::name("reviewer"))
            .unwrap(),
        agent
    );
    let err = h
        .coordinator
        .resolve_agent(&AgentSelector::id("agent-missing"))
        .unwrap_err();
    assert!(matches!(err, Error::AgentNotFound(_)));
    assert_eq!(err.exit_code(), 3);
}
