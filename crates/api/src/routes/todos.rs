use axum::routing::{get, put};
use axum::Router;

use crate::handlers::todos;
use crate::state::AppState;

/// Todo routes, mounted at the root.
///
/// ```text
/// GET    /todos          -> list_todos
/// POST   /todos          -> create_todo
/// PUT    /todos/{id}     -> update_todo
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/todos", get(todos::list_todos).post(todos::create_todo))
        .route("/todos/{id}", put(todos::update_todo))
}
