//! Agent connection registry for the relay's push hub.

pub mod push_hub;
