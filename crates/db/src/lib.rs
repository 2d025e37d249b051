//! Todo document storage.
//!
//! The backend talks to storage only through the [`TodoStore`] trait.
//! [`MongoTodoStore`] is the production store; [`MemoryTodoStore`] serves
//! tests and deployments without `MONGO_HOST`.

pub mod config;
pub mod models;
pub mod mongo;
pub mod store;

use std::sync::Arc;

pub use config::{MongoConfig, StoreConfig};
pub use mongo::MongoTodoStore;
pub use store::{MemoryTodoStore, StoreError, TodoStore};

/// Shared handle to the configured store.
pub type DbPool = Arc<dyn TodoStore>;

/// Create the store selected by `config`.
pub async fn create_pool(config: &StoreConfig) -> Result<DbPool, StoreError> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("MONGO_HOST not set, using in-memory todo store");
            Ok(memory_pool())
        }
        StoreConfig::Mongo(mongo) => Ok(Arc::new(MongoTodoStore::connect(mongo).await?)),
    }
}

/// A fresh in-memory store.
pub fn memory_pool() -> DbPool {
    Arc::new(MemoryTodoStore::new())
}

/// Verify that the store can serve requests.
pub async fn health_check(pool: &DbPool) -> Result<(), StoreError> {
    pool.health_check().await
}
