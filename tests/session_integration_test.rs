//! Integration tests for sessions, memory and the mesh runtime
//!
//! These tests verify expiry, compaction, file-backed memory and a
//! long-running task driven through chat commands.

use agentmesh::agent::AgentState;
use agentmesh::config::{Configuration, SessionConfig};
use agentmesh::errors::MeshError;
use agentmesh::memory::MemoryBank;
use agentmesh::orchestration::MeshRuntime;
use agentmesh::session::SessionStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_session_expires_after_inactivity() {
    let store = SessionStore::new(&SessionConfig::default()).with_timeout(Duration::from_millis(150));
    let sid = store.create(Some("farmer"), None);

    // reads inside the timeout keep the session alive
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.get(&sid).is_ok());
    }

    std::thread::sleep(Duration::from_millis(200));
    assert!(matches!(
        store.get(&sid),
        Err(MeshError::SessionNotFound { .. })
    ));
    assert!(store.context_for(&sid).is_err());
    assert_eq!(store.sweep_expired(), 1);
    assert!(store.is_empty());
}

#[test]
fn test_history_compaction_keeps_anchor() {
    let store = SessionStore::new(&SessionConfig::default());
    let sid = store.create(None, None);

    for i in 1..=60 {
        store
            .append_message(&sid, "user", &format!("message {}", i), None)
            .unwrap();
    }

    let history = store.get(&sid).unwrap().conversation_history;
    assert_eq!(history.len(), 50);
    assert_eq!(history[0].content, "message 1");
    assert_eq!(history[1].content, "message 12");
    assert_eq!(history[49].content, "message 60");
}

#[test]
fn test_memory_persists_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("memory_bank.json");

    {
        let bank = MemoryBank::with_storage(&path);
        bank.put("s1", "crop", json!("rice"), None);
        bank.put("s1", "acres", json!(4), None);
        bank.put("s2", "crop", json!("wheat"), None);
        assert_eq!(bank.get("s1", "crop"), Some(json!("rice")));
    }
    assert!(path.exists());

    let reopened = MemoryBank::with_storage(&path);
    assert_eq!(reopened.get("s1", "acres"), Some(json!(4)));
    assert_eq!(reopened.get_or("s1", "missing", json!("n/a")), json!("n/a"));
    // the earlier read was persisted
    assert_eq!(reopened.entry("s1", "crop").unwrap().access_count, 1);
    assert_eq!(reopened.stats().total_sessions, 2);

    reopened.delete("s2", None);
    assert!(MemoryBank::with_storage(&path).all("s2").is_empty());
}

#[test]
fn test_context_carries_memory_snapshot() {
    let bank = Arc::new(MemoryBank::in_memory());
    let store = SessionStore::new(&SessionConfig::default()).with_memory(bank.clone());
    let sid = store.create(None, None);

    bank.put(&sid, "soil", json!("loam"), None);
    store.set_state(&sid, "step", json!(2)).unwrap();

    let ctx = store.context_for(&sid).unwrap();
    assert_eq!(ctx.memory, bank.all(&sid));
    assert_eq!(ctx.state.get("step"), Some(&json!(2)));

    // the snapshot does not bump access counters
    assert_eq!(bank.entry(&sid, "soil").unwrap().access_count, 0);
}

#[tokio::test]
async fn test_long_running_task_through_runtime() {
    let runtime = MeshRuntime::default();
    let sid = runtime.create_session(Some("farmer"));
    let target = vec!["long_running_agent".to_string()];
    let target = Some(target.as_slice());

    let started = runtime
        .handle_targeted(&sid, "please start task", "seq", target)
        .await
        .unwrap();
    assert!(started.content.starts_with("Started long-running task"));

    let paused = runtime.handle_targeted(&sid, "pause", "seq", target).await.unwrap();
    assert!(paused.content.contains("\"status\": \"paused\""));
    let status = runtime.orchestrator().status();
    assert_eq!(status["long_running_agent"].state, AgentState::Paused);

    let resumed = runtime.handle_targeted(&sid, "resume", "seq", target).await.unwrap();
    assert!(resumed.content.contains("\"status\": \"running\""));

    let done = runtime
        .handle_targeted(&sid, "complete task", "seq", target)
        .await
        .unwrap();
    assert!(done.content.contains("\"progress\": 100"));
    assert!(!done.outcome.has_errors());

    let rejected = runtime.handle_targeted(&sid, "pause", "seq", target).await.unwrap();
    assert!(rejected.outcome.has_errors());
    assert!(rejected.content.contains("cannot pause while completed"));

    // five user turns and five replies
    let history = runtime.sessions().get(&sid).unwrap().conversation_history;
    assert_eq!(history.len(), 10);
}

#[tokio::test]
async fn test_runtime_memory_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Configuration::default();
    config.memory.storage_path = Some(temp_dir.path().join("memory.json"));

    let first = MeshRuntime::from_config(config.clone());
    first.memory().put("s1", "region", json!("Tamil Nadu"), None);
    drop(first);

    let second = MeshRuntime::from_config(config);
    assert_eq!(second.memory().get("s1", "region"), Some(json!("Tamil Nadu")));
}
