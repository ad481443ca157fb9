//! # Reply Objects
//!
//! Replies the server synthesizes when a handler does not supply one.
//!
//! | Situation | Reply |
//! |-----------|-------|
//! | Handler returned nothing | `{"event":"__response__","data":{"status":"success"}}` |
//! | Handler failed | `{"event":"__response__","data":{"status":"error","message":...}}` |
//! | No handler bound | `{"event":"__error__","data":{"message":...}}` |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event name of server-generated status replies.
pub const RESPONSE_EVENT: &str = "__response__";

/// Event name of the reply sent when no handler is bound.
pub const ERROR_EVENT: &str = "__error__";

/// Status carried by a `__response__` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// Reply for a handler that completed without returning data.
pub fn success() -> Value {
    json!({
        "event": RESPONSE_EVENT,
        "data": { "status": ReplyStatus::Success },
    })
}

/// Reply for a request that failed while being handled.
pub fn failure(message: &str) -> Value {
    json!({
        "event": RESPONSE_EVENT,
        "data": { "status": ReplyStatus::Error, "message": message },
    })
}

/// Reply for an event that has no handler on the server.
pub fn unbound_event(event: &str) -> Value {
    json!({
        "event": ERROR_EVENT,
        "data": { "message": format!("Server has no handler bound for event: {event}") },
    })
}

/// Returns true if `reply` is one of the error replies built above.
pub fn is_error(reply: &Value) -> bool {
    match reply.get("event").and_then(Value::as_str) {
        Some(ERROR_EVENT) => true,
        Some(RESPONSE_EVENT) => reply["data"]["status"] == "error",
        _ => false,
    }
}
