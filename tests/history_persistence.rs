//! Integration tests for the file-backed history store.

use gemrelay::relay::context::{ConversationTurn, Role};
use gemrelay::relay::history::{HistoryError, HistoryStore, SCHEMA_VERSION};
use tempfile::TempDir;

#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");

    {
        let store = HistoryStore::open(&path).unwrap();
        store.append(42, Role::User, "remember me").unwrap();
        store.append(42, Role::Assistant, "I will").unwrap();
    }

    let store = HistoryStore::open(&path).unwrap();
    assert_eq!(
        store.read(42).unwrap(),
        vec![ConversationTurn::user("remember me"), ConversationTurn::assistant("I will")]
    );
}

#[test]
fn test_clear_is_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");

    {
        let store = HistoryStore::open(&path).unwrap();
        store.append(1, Role::User, "gone").unwrap();
        store.append(2, Role::User, "stays").unwrap();
        store.clear(1).unwrap();
    }

    let store = HistoryStore::open(&path).unwrap();
    assert!(store.read(1).unwrap().is_empty());
    assert_eq!(store.read(2).unwrap(), vec![ConversationTurn::user("stays")]);
}

#[test]
fn test_creates_missing_data_dir() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/state/history.db");

    let store = HistoryStore::open(&path).unwrap();
    store.append(1, Role::User, "hi").unwrap();
    assert!(path.exists());
}

#[test]
fn test_newer_schema_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .unwrap();
    }

    match HistoryStore::open(&path) {
        Err(HistoryError::UnsupportedSchema { found, supported }) => {
            assert_eq!(found, SCHEMA_VERSION + 1);
            assert_eq!(supported, SCHEMA_VERSION);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected schema version error"),
    }
}

#[test]
fn test_recent_window_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");

    {
        let store = HistoryStore::open(&path).unwrap();
        for i in 0..60 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append(7, role, &format!("turn {i}")).unwrap();
        }
    }

    let store = HistoryStore::open(&path).unwrap();
    let recent = store.read_recent(7, 30).unwrap();
    let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
    let expected: Vec<String> = (30..60).map(|i| format!("turn {i}")).collect();
    assert_eq!(contents, expected);
}
