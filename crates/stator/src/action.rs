//! Actions and the dispatchable tagged union
//!
//! A plain [`Action`] is an immutable description of a state change, carried
//! through the batch queue and the middleware chain to the reducers. A
//! [`Thunk`] is a unit of async work: it receives a [`StoreHandle`] and may
//! dispatch further actions itself, immediately or after suspension.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::StoreHandle;

/// Reserved action kind recognized by the cancellation middleware.
pub const CANCEL_REQUEST_KIND: &str = "@@cancelRequest";

/// Reserved meta field recognized by the debounce middleware (delay in ms).
pub const DEBOUNCE_META: &str = "debounce";

/// Payload field carrying the request identifier of a cancel action.
pub const REQUEST_ID_FIELD: &str = "requestId";

/// An immutable description of a state change request.
///
/// Identified by `kind` (serialized as `"type"`); `payload` and `meta` are
/// free-form JSON values so actions stay serializable and loggable.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, Value>,
}

impl Action {
    /// Create an action with no payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            meta: HashMap::new(),
        }
    }

    /// Create an action carrying a payload.
    pub fn with_payload(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload.into()),
            meta: HashMap::new(),
        }
    }

    /// Attach a meta field (builder style).
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Read a meta field as an integer number of milliseconds.
    pub fn meta_millis(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(Value::as_u64)
    }

    /// Build the reserved `@@cancelRequest` action for a request identifier.
    pub fn cancel_request(request_id: impl Into<String>) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert(REQUEST_ID_FIELD.into(), Value::String(request_id.into()));
        Self::with_payload(CANCEL_REQUEST_KIND, Value::Object(payload))
    }

    /// Extract `payload.requestId`, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get(REQUEST_ID_FIELD))
            .and_then(Value::as_str)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Action");
        dbg.field("kind", &self.kind);
        if let Some(payload) = &self.payload {
            dbg.field("payload", payload);
        }
        if !self.meta.is_empty() {
            dbg.field("meta", &self.meta);
        }
        dbg.finish()
    }
}

/// Async unit of work: runs immediately on dispatch with a handle back into
/// the store, and drives further dispatches itself.
pub type Thunk = Box<dyn FnOnce(StoreHandle) + Send + 'static>;

/// What `dispatch` accepts: a plain action (batched, reduced) or a thunk
/// (invoked immediately, bypasses batching and reducers).
///
/// The split is an explicit tag, resolved once at the dispatch boundary.
pub enum Dispatchable {
    Action(Action),
    Thunk(Thunk),
}

impl Dispatchable {
    /// Wrap a closure as a dispatchable thunk.
    pub fn thunk(f: impl FnOnce(StoreHandle) + Send + 'static) -> Self {
        Self::Thunk(Box::new(f))
    }
}

impl From<Action> for Dispatchable {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl From<Thunk> for Dispatchable {
    fn from(thunk: Thunk) -> Self {
        Self::Thunk(thunk)
    }
}

impl fmt::Debug for Dispatchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Self::Thunk(_) => write!(f, "Thunk"),
        }
    }
}
