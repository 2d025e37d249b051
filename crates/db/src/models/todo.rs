//! Todo document model.

use serde::Serialize;
use todo_core::types::{Timestamp, TodoId};

/// A stored todo document.
///
/// Serialized as `{_id, task, done}`, the document shape the frontend
/// expects. `created_at` stays server-side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    #[serde(rename = "_id")]
    pub id: TodoId,
    pub task: String,
    pub done: bool,
    #[serde(skip_serializing)]
    pub created_at: Timestamp,
}

/// Input for inserting a new todo.
#[derive(Debug, Clone)]
pub struct CreateTodo {
    pub task: String,
}
