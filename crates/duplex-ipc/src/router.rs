//! Event name to handler lookup.
//!
//! Each client and server owns its own router; nothing is shared between
//! instances. Handlers are cloned out under the lock and run outside it, so
//! a handler may register further handlers without deadlocking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Result of a request handler: `Some(reply)` is sent verbatim, `None`
/// becomes a success status reply, `Err` becomes an error status reply.
pub type HandlerResult = anyhow::Result<Option<Value>>;

/// Handler for broadcast events received by a client.
pub type EventHandler = dyn Fn(&Value) + Send + Sync;

/// Handler for requests received by a server.
pub type RequestHandler = dyn Fn(&Value) -> HandlerResult + Send + Sync;

/// Map from event name to handler. The last registration for a name wins.
pub struct EventRouter<H: ?Sized> {
    handlers: Mutex<HashMap<String, Arc<H>>>,
}

impl<H: ?Sized> EventRouter<H> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Bind `handler` to `event`. Returns true if it replaced an earlier one.
    pub fn insert(&self, event: impl Into<String>, handler: Arc<H>) -> bool {
        self.handlers.lock().insert(event.into(), handler).is_some()
    }

    pub fn get(&self, event: &str) -> Option<Arc<H>> {
        self.handlers.lock().get(event).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }
}

impl<H: ?Sized> Default for EventRouter<H> {
    fn default() -> Self {
        Self::new()
    }
}
