//! Cross-crate integration flows.

pub mod encryption;
pub mod lifecycle;
pub mod pubsub;
pub mod request_reply;
