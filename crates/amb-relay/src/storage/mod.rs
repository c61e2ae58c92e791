//! SQLite storage for the agent mailbox relay.
//!
//! Persists agents, connections, sessions, and messages per the relay's
//! data model. All writes go through [`RelayDatabase`]; reads that need a
//! consistent snapshot across several queries also take a transaction.

mod db;
mod models;
pub mod queries;

pub use amb_core::db::DatabaseError;
pub use db::RelayDatabase;
pub use models::*;
