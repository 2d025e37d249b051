//! Todo store trait and its in-memory implementation.
//!
//! The MongoDB implementation lives in [`crate::mongo`].

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use todo_core::types::TodoId;
use uuid::Uuid;

use crate::models::todo::{CreateTodo, Todo};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The MongoDB driver reported an error.
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Document store holding todos, keyed by an opaque id.
///
/// A returned `Ok` means the write has been acknowledged; callers build
/// mutation events only after that point.
#[async_trait]
pub trait TodoStore: Send + Sync + 'static {
    /// All todos in insertion order.
    async fn list(&self) -> Result<Vec<Todo>, StoreError>;

    /// Insert a new todo with `done = false`.
    async fn insert(&self, input: CreateTodo) -> Result<Todo, StoreError>;

    /// Set the `done` flag. Returns `None` if no todo has that id.
    async fn set_done(&self, id: &str, done: bool) -> Result<Option<Todo>, StoreError>;

    /// Whether `id` has the shape of an id this store could have minted.
    fn is_valid_id(&self, id: &str) -> bool;

    async fn health_check(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryTodoStore
// ---------------------------------------------------------------------------

/// In-process document store backed by an insertion-ordered map.
#[derive(Default)]
pub struct MemoryTodoStore {
    todos: RwLock<IndexMap<TodoId, Todo>>,
}

impl MemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id() -> TodoId {
        Uuid::new_v4().simple().to_string()
    }
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        Ok(self.todos.read().await.values().cloned().collect())
    }

    async fn insert(&self, input: CreateTodo) -> Result<Todo, StoreError> {
        let todo = Todo {
            id: Self::mint_id(),
            task: input.task,
            done: false,
            created_at: Utc::now(),
        };

        self.todos
            .write()
            .await
            .insert(todo.id.clone(), todo.clone());

        tracing::debug!(id = %todo.id, "Todo inserted");
        Ok(todo)
    }

    async fn set_done(&self, id: &str, done: bool) -> Result<Option<Todo>, StoreError> {
        let mut todos = self.todos.write().await;
        let Some(todo) = todos.get_mut(id) else {
            return Ok(None);
        };
        todo.done = done;
        Ok(Some(todo.clone()))
    }

    fn is_valid_id(&self, id: &str) -> bool {
        Uuid::try_parse(id).is_ok()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn create(task: &str) -> CreateTodo {
        CreateTodo {
            task: task.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_valid_id_and_not_done() {
        let store = MemoryTodoStore::new();

        let todo = store.insert(create("buy milk")).await.unwrap();

        assert!(store.is_valid_id(&todo.id));
        assert_eq!(todo.task, "buy milk");
        assert!(!todo.done);
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let store = MemoryTodoStore::new();
        for task in ["first", "second", "third"] {
            store.insert(create(task)).await.unwrap();
        }

        let tasks: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task)
            .collect();
        assert_eq!(tasks, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn set_done_updates_existing_todo() {
        let store = MemoryTodoStore::new();
        let todo = store.insert(create("walk dog")).await.unwrap();

        let updated = store.set_done(&todo.id, true).await.unwrap().unwrap();
        assert!(updated.done);
        assert!(store.list().await.unwrap()[0].done);
    }

    #[tokio::test]
    async fn set_done_unknown_id_returns_none() {
        let store = MemoryTodoStore::new();
        let id = MemoryTodoStore::mint_id();

        assert!(store.set_done(&id, true).await.unwrap().is_none());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let store = MemoryTodoStore::new();
        assert!(!store.is_valid_id("42"));
        assert!(!store.is_valid_id("not-an-id"));
    }

    #[test]
    fn todo_serializes_id_as_underscore_id() {
        let todo = Todo {
            id: "abc".into(),
            task: "t".into(),
            done: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&todo).unwrap();
        assert_eq!(json["_id"], "abc");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn todo_json_exposes_only_public_fields() {
        let todo = Todo {
            id: "abc".into(),
            task: "t".into(),
            done: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&todo).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["_id", "done", "task"]);
    }
}
