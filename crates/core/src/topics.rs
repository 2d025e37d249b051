//! Well-known bus topic and message label constants.
//!
//! The topic must match between the backend (publisher) and the
//! broadcaster (subscriber). Changing it in one place without the other
//! silently disconnects the mirror.

/// Topic every todo mutation is published to.
pub const MUTATION_TOPIC: &str = "db-updates";

/// Label prefixed to the payload of a created-todo message.
pub const LABEL_CREATED: &str = "NEW TODO";

/// Label prefixed to the payload of an updated-todo message.
pub const LABEL_UPDATED: &str = "TODO UPDATED";

/// Separator between the label and the JSON body on the wire.
pub const LABEL_SEPARATOR: &str = ": ";
