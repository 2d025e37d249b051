/// Todo identifiers are opaque strings minted by the document store.
pub type TodoId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum number of characters accepted for a task description.
pub const MAX_TASK_LEN: usize = 140;
