//! Bus-to-webhook broadcaster.
//!
//! Subscribes to the mutation topic and relays every message to a chat
//! webhook, or only logs it in log-only mode.

pub mod config;
pub mod service;
