//! Records written by older schema versions are upgraded on load and persisted once.

mod common;

use std::fs;

use common::Harness;
use serde_json::{json, Value};
use tandem_core::{
    models::{AgentNameIndex, DecisionStatus},
    DecisionQuery, RecordKey, RecordKind,
};

fn write_envelope(path: &std::path::Path, version: u32, kind: &str, data: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let envelope = json!({
        "schema_version": version,
        "kind": kind,
        "written_at": "2024-01-01T00:00:00Z",
        "data": data,
    });
    fs::write(path, serde_json::to_vec(&envelope).unwrap()).unwrap();
}

fn read_version(path: &std::path::Path) -> u64 {
    let raw: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    raw["schema_version"].as_u64().unwrap()
}

#[test]
fn v1_agent_profile_is_upgraded_and_persisted() {
    let h = Harness::new();
    let root = h.coordinator.config().root.clone();
    let profile_path = root.join("agents").join("agent-legacy").join("profile.json");

    write_envelope(
        &profile_path,
        1,
        "agent_profile",
        &json!({
            "id": "agent-legacy",
            "name": "legacy",
            "agent_type": "coder",
            "capabilities": "rust,python",
            "registered_at": "2024-01-01T00:00:00Z",
            "last_active": "2024-01-01T00:00:00Z",
        }),
    );
    let mut names = AgentNameIndex::default();
    names
        .by_name
        .insert("legacy".into(), "agent-legacy".into());
    h.coordinator
        .store()
        .save(&RecordKey::new(RecordKind::Registry, "agents", "names").unwrap(), &names)
        .unwrap();

    let profile = h.coordinator.agents().get(&"agent-legacy".into()).unwrap();
    assert_eq!(profile.capabilities, vec!["rust", "python"]);
    assert_eq!(profile.session_count, 1);
    assert_eq!(read_version(&profile_path), 2);

    let again = h.coordinator.register_agent("legacy", "coder", &[]).unwrap();
    assert!(again.reconnected);
    assert_eq!(again.profile.session_count, 2);
}

#[test]
fn v1_decision_is_upgraded_and_indexed() {
    let h = Harness::new();
    let project = h.project("app");
    let root = h.coordinator.config().root.clone();
    let decision_path = root
        .join("decisions")
        .join(project.as_str())
        .join("dec-legacy.json");

    write_envelope(
        &decision_path,
        1,
        "decision",
        &json!({
            "id": "dec-legacy",
            "title": "Legacy database choice",
            "author": "agent-old",
            "files": ["db/schema.sql"],
            "timestamp": "2024-01-01T00:00:00Z",
        }),
    );

    let decision = h.coordinator.get_decision(&project, "dec-legacy").unwrap();
    assert_eq!(decision.related_files, vec!["db/schema.sql"]);
    assert_eq!(decision.status, DecisionStatus::Accepted);
    assert_eq!(read_version(&decision_path), 2);

    let hits = h
        .coordinator
        .search_decisions(&project, &DecisionQuery::text("legacy database"))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].relevance, 2);
}

#[test]
fn future_schema_version_is_corruption() {
    let h = Harness::new();
    let project = h.project("app");
    let root = h.coordinator.config().root.clone();
    write_envelope(
        &root.join("decisions").join(project.as_str()).join("dec-future.json"),
        99,
        "decision",
        &json!({"id": "dec-future"}),
    );

    assert!(matches!(
        h.coordinator.get_decision(&project, "dec-future"),
        Err(tandem_core::Error::DataCorruption { .. })
    ));
}
