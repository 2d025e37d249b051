//! Todo handlers.
//!
//! Every successful write is mirrored to the bus after the store has
//! acknowledged it. Mirroring never changes the HTTP response.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use todo_core::error::CoreError;
use todo_core::events::MutationEvent;
use todo_core::types::{TodoId, MAX_TASK_LEN};
use todo_db::models::todo::{CreateTodo, Todo};

use crate::error::{AppError, AppResult};
use crate::mirror::mirror_mutation;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonTaskBody {
    #[serde(default)]
    task: String,
}

#[derive(Debug, Deserialize)]
struct FormTaskBody {
    #[serde(default)]
    todo: String,
}

/// New-task input, accepted either as JSON `{"task": ...}` or as an
/// urlencoded form with a `todo` field.
#[derive(Debug)]
pub struct TaskInput(pub String);

impl<S> FromRequest<S> for TaskInput
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<JsonTaskBody>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(body.task))
        } else {
            let Form(body) = Form::<FormTaskBody>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(body.todo))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: TodoId,
    pub task: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub success: bool,
    pub id: TodoId,
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /todos
pub async fn list_todos(State(state): State<AppState>) -> AppResult<Json<Vec<Todo>>> {
    let todos = state.pool.list().await?;
    tracing::info!(count = todos.len(), "Todos fetched");
    Ok(Json(todos))
}

/// POST /todos
///
/// Insert a new task with `done = false` and mirror a `Created` event.
pub async fn create_todo(
    State(state): State<AppState>,
    TaskInput(task): TaskInput,
) -> AppResult<impl IntoResponse> {
    validate_task(&task)?;

    let todo = state.pool.insert(CreateTodo { task }).await?;
    tracing::info!(id = %todo.id, task = %todo.task, "Task added");

    let event = MutationEvent::created(todo.id.clone())
        .with_field("task", todo.task.as_str())
        .with_field("done", todo.done);
    mirror_mutation(&state.bridge, event).await;

    Ok(Json(CreatedResponse {
        success: true,
        id: todo.id,
        task: todo.task,
    }))
}

/// PUT /todos/{id}
///
/// Set the `done` flag and mirror an `Updated` event. Any JSON value is
/// accepted for `done` and coerced by truthiness.
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<TodoId>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    if !state.pool.is_valid_id(&id) {
        tracing::warn!(%id, "Invalid task id");
        return Err(AppError::BadRequest("Invalid task ID".into()));
    }

    let done = body
        .ok()
        .and_then(|Json(value)| value.get("done").map(is_truthy))
        .ok_or_else(|| AppError::BadRequest("Missing 'done' field in request body".into()))?;

    let todo = state
        .pool
        .set_done(&id, done)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: id.clone(),
        })?;
    tracing::info!(id = %todo.id, done, "Done status updated");

    let event = MutationEvent::updated(todo.id.clone())
        .with_field("task", todo.task.as_str())
        .with_field("done", todo.done);
    mirror_mutation(&state.bridge, event).await;

    Ok(Json(UpdatedResponse {
        success: true,
        id: todo.id,
        done: todo.done,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reject empty tasks and tasks over [`MAX_TASK_LEN`] characters.
fn validate_task(task: &str) -> Result<(), CoreError> {
    if task.is_empty() {
        tracing::warn!("Empty task received");
        return Err(CoreError::Validation("Empty task not allowed".into()));
    }
    if task.chars().count() > MAX_TASK_LEN {
        tracing::warn!(len = task.chars().count(), "Task exceeds length limit");
        return Err(CoreError::Validation(format!(
            "Task too long (max {MAX_TASK_LEN} characters)"
        )));
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_task_is_rejected() {
        assert_matches!(validate_task(""), Err(CoreError::Validation(msg)) if msg == "Empty task not allowed");
    }

    #[test]
    fn task_at_limit_is_accepted() {
        assert!(validate_task(&"a".repeat(MAX_TASK_LEN)).is_ok());
    }

    #[test]
    fn task_over_limit_is_rejected() {
        assert_matches!(
            validate_task(&"a".repeat(MAX_TASK_LEN + 1)),
            Err(CoreError::Validation(msg)) if msg == "Task too long (max 140 characters)"
        );
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        assert!(validate_task(&"é".repeat(MAX_TASK_LEN)).is_ok());
    }

    #[test]
    fn truthiness_follows_json_values() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
    }
}
