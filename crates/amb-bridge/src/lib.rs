//! Agent mailbox bridge daemon library.
//!
//! Maintains a reconnecting WebSocket push-channel connection to the relay,
//! routes incoming messages into a local executor session, and plumbs
//! replies back through the relay with loop-breaking.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod framing;
pub mod relay_client;
pub mod ws_client;
