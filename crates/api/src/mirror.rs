//! Hand-off from request handlers to the event bridge.
//!
//! `EventBridge::publish` blocks, so it runs on the blocking pool. The
//! outcome is logged by the bridge and never reaches the HTTP response.

use std::sync::Arc;

use todo_core::events::MutationEvent;
use todo_events::EventBridge;

/// Publish `event` for an already acknowledged write.
///
/// Waits at most the bridge's publish timeout. Returns whether the bus
/// acknowledged the event.
pub async fn mirror_mutation(bridge: &Arc<EventBridge>, event: MutationEvent) -> bool {
    let bridge = Arc::clone(bridge);

    match tokio::task::spawn_blocking(move || bridge.publish(&event)).await {
        Ok(result) => result.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Mirror publish task failed");
            false
        }
    }
}
