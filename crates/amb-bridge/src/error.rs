//! Bridge error types.

/// Errors surfaced by the bridge's configuration, relay client, and gateway
/// adapter. Routing/dispatch failures (executor timeouts, malformed events)
/// are logged and swallowed at the call site — they never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("relay connection error: {0}")]
    Connection(String),

    #[error("relay authentication error: {0}")]
    Auth(String),

    #[error("relay HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}
