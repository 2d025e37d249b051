//! MongoDB-backed todo store.
//!
//! Documents keep the `{_id: ObjectId, task, done}` shape so existing
//! collections stay readable. Creation time is taken from the ObjectId.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};

use crate::config::MongoConfig;
use crate::models::todo::{CreateTodo, Todo};
use crate::store::{StoreError, TodoStore};

const COLLECTION: &str = "todos";

#[derive(Debug, Serialize, Deserialize)]
struct TodoDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    task: String,
    #[serde(default)]
    done: bool,
}

impl From<TodoDocument> for Todo {
    fn from(doc: TodoDocument) -> Self {
        let created_at = DateTime::from_timestamp_millis(doc.id.timestamp().timestamp_millis())
            .unwrap_or_else(Utc::now);
        Todo {
            id: doc.id.to_hex(),
            task: doc.task,
            done: doc.done,
            created_at,
        }
    }
}

/// Todo store over a MongoDB collection.
pub struct MongoTodoStore {
    database: Database,
    todos: Collection<TodoDocument>,
}

impl MongoTodoStore {
    /// Build a client for `config`. The driver connects lazily, so an
    /// unreachable server surfaces on the first operation.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(config.uri()).await?;
        let database = client.database(&config.database);
        let todos = database.collection(COLLECTION);

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "MongoDB client created"
        );

        Ok(Self { database, todos })
    }
}

#[async_trait]
impl TodoStore for MongoTodoStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        let docs: Vec<TodoDocument> = self
            .todos
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(docs.into_iter().map(Todo::from).collect())
    }

    async fn insert(&self, input: CreateTodo) -> Result<Todo, StoreError> {
        let document = TodoDocument {
            id: ObjectId::new(),
            task: input.task,
            done: false,
        };
        self.todos.insert_one(&document).await?;

        tracing::debug!(id = %document.id, "Todo inserted");
        Ok(document.into())
    }

    async fn set_done(&self, id: &str, done: bool) -> Result<Option<Todo>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        let updated = self
            .todos
            .find_one_and_update(doc! { "_id": oid }, doc! { "$set": { "done": done } })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated.map(Todo::from))
    }

    fn is_valid_id(&self, id: &str) -> bool {
        ObjectId::parse_str(id).is_ok()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
