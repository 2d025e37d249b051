//! Todo mutation events and their bus wire format.
//!
//! A [`MutationEvent`] is built after the store acknowledged a write and is
//! serialized as `"<LABEL>: <JSON>"`, e.g.
//!
//! ```text
//! NEW TODO: {"action":"created","id":"9f1c…","task":"buy milk","done":false}
//! ```
//!
//! The label prefix is part of the wire contract with the broadcaster and
//! must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::topics::{LABEL_CREATED, LABEL_SEPARATOR, LABEL_UPDATED};
use crate::types::TodoId;

// ---------------------------------------------------------------------------
// MutationAction
// ---------------------------------------------------------------------------

/// Kind of write that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Created,
    Updated,
}

impl MutationAction {
    /// Human-readable label used as the wire prefix.
    pub fn label(self) -> &'static str {
        match self {
            MutationAction::Created => LABEL_CREATED,
            MutationAction::Updated => LABEL_UPDATED,
        }
    }

    /// Resolve a wire label back to its action.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            LABEL_CREATED => Some(MutationAction::Created),
            LABEL_UPDATED => Some(MutationAction::Updated),
            _ => None,
        }
    }

    /// Lowercase name written into the JSON `action` field.
    pub fn as_str(self) -> &'static str {
        match self {
            MutationAction::Created => "created",
            MutationAction::Updated => "updated",
        }
    }
}

// ---------------------------------------------------------------------------
// MutationEvent
// ---------------------------------------------------------------------------

/// A todo write that has been acknowledged by the store.
///
/// Constructed via [`MutationEvent::created`] or [`MutationEvent::updated`]
/// and enriched with [`with_field`](MutationEvent::with_field).
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub action: MutationAction,
    pub id: TodoId,
    /// Task fields relevant to the write (e.g. `task`, `done`).
    pub fields: Map<String, Value>,
}

impl MutationEvent {
    pub fn new(action: MutationAction, id: impl Into<TodoId>) -> Self {
        Self {
            action,
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn created(id: impl Into<TodoId>) -> Self {
        Self::new(MutationAction::Created, id)
    }

    pub fn updated(id: impl Into<TodoId>) -> Self {
        Self::new(MutationAction::Updated, id)
    }

    /// Attach a task field. `action` and `id` are reserved and ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "action" && key != "id" {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Flattened JSON body: `action` and `id` first, then the task fields.
    pub fn to_json(&self) -> Value {
        let mut body = Map::with_capacity(self.fields.len() + 2);
        body.insert("action".into(), Value::from(self.action.as_str()));
        body.insert("id".into(), Value::from(self.id.clone()));
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    /// Render the `"<LABEL>: <JSON>"` text sent on the bus.
    pub fn to_wire_text(&self) -> String {
        format!(
            "{}{}{}",
            self.action.label(),
            LABEL_SEPARATOR,
            self.to_json()
        )
    }

    /// Encode the wire text as bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_wire_text().into_bytes()
    }

    /// Parse a wire payload back into an event.
    ///
    /// The label decides the action; the JSON body must be an object with a
    /// string `id`. Any `action` key in the body is ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        Self::decode_text(text)
    }

    /// [`decode`](Self::decode) for an already UTF-8 checked payload.
    pub fn decode_text(text: &str) -> Result<Self, DecodeError> {
        let (label, json) = text
            .split_once(LABEL_SEPARATOR)
            .ok_or(DecodeError::MissingLabel)?;

        let action = MutationAction::from_label(label.trim())
            .ok_or_else(|| DecodeError::UnknownLabel(label.to_string()))?;

        let mut body = match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => map,
            _ => return Err(DecodeError::NotAnObject),
        };

        let id = match body.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(DecodeError::MissingId),
        };
        body.remove("action");

        Ok(Self {
            action,
            id,
            fields: body,
        })
    }
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Why a bus payload could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("payload has no \"<LABEL>: \" prefix")]
    MissingLabel,

    #[error("unknown message label {0:?}")]
    UnknownLabel(String),

    #[error("payload body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload body is not a JSON object")]
    NotAnObject,

    #[error("payload body has no string \"id\"")]
    MissingId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
