//! Todo backend library.
//!
//! Exposes config, state, error handling, routes and the shared router
//! builder so integration tests and the binary entrypoint use the same
//! stack. Every acknowledged write is mirrored to the bus through
//! [`mirror`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod mirror;
pub mod router;
pub mod routes;
pub mod state;
