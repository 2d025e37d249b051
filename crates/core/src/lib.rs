//! Shared domain types for the todo service and its mutation mirror.
//!
//! - [`events`]: the [`MutationEvent`](events::MutationEvent) model and its
//!   `"<LABEL>: <JSON>"` wire codec.
//! - [`topics`]: bus topic and label constants shared by the backend and
//!   the broadcaster.
//! - [`error`]: the domain error type surfaced by handlers.

pub mod error;
pub mod events;
pub mod topics;
pub mod types;
