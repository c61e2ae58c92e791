//! Bridge configuration: the relay/gateway endpoints and credentials the
//! daemon needs, read entirely from environment variables.

use std::time::Duration;

use clap::Parser;

use crate::error::BridgeError;

const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 300;

/// Bridge daemon configuration. No CLI arguments are required; every field
/// is sourced from the environment variable named in its `env` attribute.
#[derive(Parser, Debug, Clone)]
#[command(name = "amb-bridge")]
#[command(version, about = "Agent mailbox bridge daemon")]
pub struct BridgeConfig {
    /// Relay host[:port], optionally prefixed with a scheme.
    #[arg(long, env = "MAILBOX_SERVER_URL")]
    pub mailbox_server_url: String,

    /// API key issued by `POST /agents/register` on the relay.
    #[arg(long, env = "MAILBOX_API_KEY")]
    pub mailbox_api_key: String,

    /// Base URL of this agent's local executor ("gateway").
    #[arg(long, env = "OPENCLAW_GATEWAY_URL")]
    pub openclaw_gateway_url: String,

    /// Bearer token for the local executor's `/tools/invoke` endpoint.
    #[arg(long, env = "OPENCLAW_GATEWAY_TOKEN")]
    pub openclaw_gateway_token: String,

    /// Comma-separated agent names trusted by this bridge's owner.
    #[arg(long, env = "TRUSTED_AGENTS", value_delimiter = ',', default_value = "")]
    pub trusted_agents: Vec<String>,

    /// Seconds to wait for the local executor's reply to an injected message.
    #[arg(long, env = "AGENT_REPLY_TIMEOUT", default_value_t = DEFAULT_REPLY_TIMEOUT_SECS)]
    pub agent_reply_timeout: u64,

    /// Base URL of the owner-delivery wake hook, if configured.
    #[arg(long, env = "OPENCLAW_HOOKS_URL")]
    pub openclaw_hooks_url: Option<String>,

    /// Bearer token for the owner-delivery wake hook.
    #[arg(long, env = "OPENCLAW_HOOKS_TOKEN")]
    pub openclaw_hooks_token: Option<String>,

    /// Emit structured JSON log lines instead of human-readable text.
    #[arg(long, env = "AMB_LOG_JSON")]
    pub log_json: bool,
}

impl BridgeConfig {
    /// The relay's HTTP base URL (scheme defaulted to `https://` if absent).
    pub fn relay_http_url(&self) -> String {
        normalize_scheme(&self.mailbox_server_url)
    }

    /// The relay's push-channel WebSocket URL (`http(s)://` swapped for
    /// `ws(s)://`, with the `/ws` path appended).
    pub fn relay_ws_url(&self) -> String {
        let http = self.relay_http_url();
        let ws = http
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws", ws.trim_end_matches('/'))
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_reply_timeout)
    }

    /// Lower-cased trusted-agent names, for case-insensitive membership
    /// checks when labeling an incoming sender `TRUSTED`/`UNKNOWN`.
    pub fn trusted_agents_lower(&self) -> Vec<String> {
        self.trusted_agents
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.mailbox_server_url.trim().is_empty() {
            return Err(BridgeError::Config("MAILBOX_SERVER_URL is required".into()));
        }
        if self.mailbox_api_key.trim().is_empty() {
            return Err(BridgeError::Config("MAILBOX_API_KEY is required".into()));
        }
        if self.openclaw_gateway_url.trim().is_empty() {
            return Err(BridgeError::Config("OPENCLAW_GATEWAY_URL is required".into()));
        }
        Ok(())
    }
}

fn normalize_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", url.trim_end_matches('/'))
    }
}

/// Exponential reconnect backoff: 1s doubling to a 30s cap, reset to the
/// initial delay on every successful auth.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BridgeConfig {
        BridgeConfig {
            mailbox_server_url: url.to_string(),
            mailbox_api_key: "amb_test".to_string(),
            openclaw_gateway_url: "http://127.0.0.1:18789".to_string(),
            openclaw_gateway_token: "tok".to_string(),
            trusted_agents: vec!["Alice".to_string(), " bob ".to_string()],
            agent_reply_timeout: DEFAULT_REPLY_TIMEOUT_SECS,
            openclaw_hooks_url: None,
            openclaw_hooks_token: None,
            log_json: false,
        }
    }

    #[test]
    fn relay_http_url_defaults_to_https() {
        let c = config("relay.example.com:8000");
        assert_eq!(c.relay_http_url(), "https://relay.example.com:8000");
    }

    #[test]
    fn relay_http_url_keeps_explicit_scheme() {
        let c = config("http://localhost:8000");
        assert_eq!(c.relay_http_url(), "http://localhost:8000");
    }

    #[test]
    fn relay_ws_url_swaps_scheme_and_appends_path() {
        let c = config("relay.example.com");
        assert_eq!(c.relay_ws_url(), "wss://relay.example.com/ws");

        let c = config("http://localhost:8000");
        assert_eq!(c.relay_ws_url(), "ws://localhost:8000/ws");
    }

    #[test]
    fn trusted_agents_are_lowercased_and_trimmed() {
        let c = config("relay.example.com");
        assert_eq!(c.trusted_agents_lower(), vec!["alice", "bob"]);
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut c = config("relay.example.com");
        c.mailbox_api_key = String::new();
        assert!(c.validate().is_err());
    }

    #[test]
    fn exponential_backoff_caps_at_30s() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
    }
}
