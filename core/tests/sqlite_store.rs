//! Behavior of `SqliteStore` through the `TodoStore` trait.
//!
//! # Design
//! Most tests run against a fresh database file in a temp directory so the
//! real connect path (retry, schema, prepared statements) is exercised.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use todo_core::{ConnectOptions, ErrorKind, SqliteStore, Todo, TodoStore};

async fn file_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("todos.db")).await.unwrap();
    (dir, store)
}

// --- add / get ---

#[tokio::test]
async fn add_then_get_returns_the_same_record() {
    let (_dir, store) = file_store().await;

    for (title, completed) in [("buy milk", false), ("", true), ("ünïcödé ✓", false)] {
        let added = store.add(Todo::new(title, completed)).await.unwrap();
        assert!(added.is_persisted());
        assert_eq!(added.title, title);
        assert_eq!(added.completed, completed);

        let fetched = store.get_by_id(added.id).await.unwrap();
        assert_eq!(fetched, added);
    }
}

#[tokio::test]
async fn add_ignores_caller_supplied_id() {
    let (_dir, store) = file_store().await;
    let input = Todo {
        id: 999,
        title: "mine".to_string(),
        completed: false,
    };
    let added = store.add(input).await.unwrap();
    assert_eq!(added.id, 1);
    assert!(matches!(
        store.get_by_id(999).await.unwrap_err().kind(),
        ErrorKind::NotFound
    ));
}

// --- get_all ---

#[tokio::test]
async fn get_all_on_empty_store_is_empty() {
    let (_dir, store) = file_store().await;
    let todos = store.get_all().await.unwrap();
    assert!(todos.is_empty());
}

#[tokio::test]
async fn get_all_returns_insertion_order() {
    let (_dir, store) = file_store().await;
    let a = store.add(Todo::new("a", false)).await.unwrap();
    let b = store.add(Todo::new("b", true)).await.unwrap();
    let c = store.add(Todo::new("c", false)).await.unwrap();
    assert_eq!(store.get_all().await.unwrap(), vec![a, b, c]);
}

// --- missing ids ---

#[tokio::test]
async fn missing_id_is_not_found_everywhere() {
    let (_dir, store) = file_store().await;
    store.add(Todo::new("present", false)).await.unwrap();

    for id in [0, 2, 42, -1] {
        assert!(store.get_by_id(id).await.unwrap_err().is_not_found());
        let update = Todo {
            id,
            title: "x".to_string(),
            completed: true,
        };
        assert!(store.update(&update).await.unwrap_err().is_not_found());
        assert!(store.delete(id).await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn not_found_error_names_the_id() {
    let (_dir, store) = file_store().await;
    let err = store.get_by_id(17).await.unwrap_err();
    assert_eq!(err.to_string(), "todo 17 not found");
}

// --- update ---

#[tokio::test]
async fn update_replaces_every_field() {
    let (_dir, store) = file_store().await;
    let added = store.add(Todo::new("A", true)).await.unwrap();

    // body `{"title":"B"}` decodes with completed = false
    let replacement: Todo = serde_json::from_str(r#"{"title":"B"}"#).unwrap();
    let replacement = Todo {
        id: added.id,
        ..replacement
    };
    store.update(&replacement).await.unwrap();

    let fetched = store.get_by_id(added.id).await.unwrap();
    assert_eq!(fetched.title, "B");
    assert!(!fetched.completed);
}

// --- delete ---

#[tokio::test]
async fn delete_removes_the_record_once() {
    let (_dir, store) = file_store().await;
    let added = store.add(Todo::new("gone soon", false)).await.unwrap();

    store.delete(added.id).await.unwrap();
    assert!(store.get_by_id(added.id).await.unwrap_err().is_not_found());
    assert!(store.delete(added.id).await.unwrap_err().is_not_found());
    assert!(store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn ids_are_not_reused_after_delete() {
    let (_dir, store) = file_store().await;
    let first = store.add(Todo::new("first", false)).await.unwrap();
    store.delete(first.id).await.unwrap();
    let second = store.add(Todo::new("second", false)).await.unwrap();
    assert!(second.id > first.id);
}

// --- concurrency ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_get_distinct_ids() {
    let (_dir, store) = file_store().await;
    let store: Arc<dyn TodoStore> = Arc::new(store);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.add(Todo::new(format!("todo {i}"), false)).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(store.get_all().await.unwrap().len(), 32);
}

// --- lifecycle ---

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todos.db");

    let store = SqliteStore::open(&path).await.unwrap();
    let added = store.add(Todo::new("durable", true)).await.unwrap();
    store.close().await.unwrap();

    let store = SqliteStore::open(&path).await.unwrap();
    assert_eq!(store.get_by_id(added.id).await.unwrap(), added);
    store.close().await.unwrap();
}

#[tokio::test]
async fn connect_gives_up_after_bounded_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let options = ConnectOptions::new(dir.path().join("missing").join("todos.db"))
        .attempts(3)
        .backoff(Duration::from_millis(10));

    let err = SqliteStore::connect(options).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.to_string().starts_with("open database"));
}

#[tokio::test]
async fn connect_fails_when_schema_cannot_be_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-db");
    std::fs::write(&path, "not a sqlite database\n".repeat(64)).unwrap();

    let err = SqliteStore::connect(ConnectOptions::new(&path).attempts(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_cancelled_while_waiting_on_a_lock_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todos.db");
    let store = SqliteStore::open(&path).await.unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        store.add(Todo::new("cancelled", false)),
    )
    .await;
    assert!(outcome.is_err(), "add finished while the file was locked");

    other.execute_batch("COMMIT").unwrap();

    assert!(store.get_all().await.unwrap().is_empty());
    let after = store.add(Todo::new("after", false)).await.unwrap();
    assert_eq!(store.get_all().await.unwrap(), vec![after]);
}

#[tokio::test]
async fn add_waiting_on_a_lock_fails_after_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todos.db");
    let options = ConnectOptions::new(&path).busy_timeout(Duration::from_millis(50));
    let store = SqliteStore::connect(options).await.unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let err = store.add(Todo::new("blocked", false)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    other.execute_batch("COMMIT").unwrap();
    assert!(store.get_all().await.unwrap().is_empty());
}
