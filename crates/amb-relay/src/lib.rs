//! Agent mailbox relay
//!
//! Core functionality for the relay server:
//! - SQLite storage for agents, connections, sessions, and messages
//! - API key issuance and verification
//! - HTTP API (registration, connection handshake, message send, inbox)
//! - Per-agent WebSocket push channel

pub mod credentials;
pub mod error;
pub mod registry;
pub mod server;
pub mod storage;
