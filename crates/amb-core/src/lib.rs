//! Shared functionality for the mailbox relay and bridge binaries:
//! the common database error type and tracing bootstrap.

pub mod db;
pub mod tracing_init;
