//! Local executor adapter.
//!
//! `GatewayClient` provides the three capabilities the bridge's dispatcher
//! needs: inject a message and wait for the agent's textual reply, check
//! whether a session key belongs to this executor, and deliver a
//! notification straight into the owner's active session without
//! expecting a reply.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::BridgeConfig;

const IS_LOCAL_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TRANSPORT_OVERHEAD: u64 = 15;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client against `OPENCLAW_GATEWAY_URL`'s `/tools/invoke` surface, plus
/// the optional `/hooks/wake` owner-delivery endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    gateway_url: String,
    gateway_token: String,
    hooks_url: Option<String>,
    hooks_token: Option<String>,
}

impl GatewayClient {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            gateway_url: config.openclaw_gateway_url.trim_end_matches('/').to_string(),
            gateway_token: config.openclaw_gateway_token.clone(),
            hooks_url: config
                .openclaw_hooks_url
                .clone()
                .map(|u| u.trim_end_matches('/').to_string()),
            hooks_token: config.openclaw_hooks_token.clone(),
        }
    }

    /// Inject `message` into `session_key` and wait up to `timeout` for the
    /// agent's textual reply. Returns `None` on timeout, transport error, or
    /// an absent reply — the bridge never surfaces this as an error upward.
    pub async fn inject_and_wait(
        &self,
        session_key: &str,
        message: &str,
        timeout: Duration,
    ) -> Option<String> {
        let body = json!({
            "tool": "sessions_send",
            "args": {
                "sessionKey": session_key,
                "message": message,
                "timeoutSeconds": timeout.as_secs(),
            },
        });

        let http_timeout = Duration::from_secs(timeout.as_secs() + HTTP_TRANSPORT_OVERHEAD);
        let resp = match self
            .http
            .post(format!("{}/tools/invoke", self.gateway_url))
            .bearer_auth(&self.gateway_token)
            .timeout(http_timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(session_key, error = %e, "inject_and_wait request failed");
                return None;
            }
        };

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(
                session_key,
                "sessions_send blocked by gateway (404) — check gateway.tools.allow"
            );
            return None;
        }
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!(session_key, error = %e, "gateway returned an error status");
                return None;
            }
        };

        let value: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(session_key, error = %e, "gateway response was not valid JSON");
                return None;
            }
        };

        extract_reply(&value).inspect(|reply| {
            debug!(session_key, reply_len = reply.len(), "agent replied");
        })
    }

    /// Whether `session_key` names a session currently known to this
    /// executor — used by the dispatcher's loop-break check.
    pub async fn is_local_session(&self, session_key: &str) -> bool {
        let body = json!({"tool": "sessions_list", "args": {"limit": 200}});

        let resp = match self
            .http
            .post(format!("{}/tools/invoke", self.gateway_url))
            .bearer_auth(&self.gateway_token)
            .timeout(IS_LOCAL_TIMEOUT)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(session_key, error = %e, "is_local_session check failed");
                return false;
            }
        };

        let Ok(value) = resp.json::<Value>().await else {
            return false;
        };
        session_key_present(&value, session_key)
    }

    /// Side-effect-free delivery of a "reply arrived" notification into the
    /// owner's active session. Prefers the `/hooks/wake` mechanism when
    /// configured, falling back to a fire-and-forget `sessions_send`.
    pub async fn deliver_to_local(&self, session_key: &str, message: &str) {
        if let (Some(hooks_url), Some(hooks_token)) = (&self.hooks_url, &self.hooks_token) {
            let body = json!({"text": message, "mode": "now", "sessionKey": session_key});
            match self
                .http
                .post(format!("{hooks_url}/hooks/wake"))
                .bearer_auth(hooks_token)
                .timeout(DELIVERY_TIMEOUT)
                .json(&body)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
            {
                Ok(_) => {
                    debug!(session_key, "delivered via /hooks/wake");
                    return;
                }
                Err(e) => {
                    warn!(session_key, error = %e, "/hooks/wake delivery failed, falling back");
                }
            }
        }

        let body = json!({
            "tool": "sessions_send",
            "args": {"sessionKey": session_key, "message": message, "timeoutSeconds": 0},
        });
        if let Err(e) = self
            .http
            .post(format!("{}/tools/invoke", self.gateway_url))
            .bearer_auth(&self.gateway_token)
            .timeout(DELIVERY_TIMEOUT)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            warn!(session_key, error = %e, "sessions_send fallback delivery failed");
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvokeResult {
    #[serde(default)]
    result: ResultBody,
}

#[derive(Debug, Default, Deserialize)]
struct ResultBody {
    #[serde(default)]
    details: Details,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct Details {
    status: Option<String>,
    reply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: String,
}

/// `result.details.reply`, falling back to parsing `result.content[0].text`
/// as JSON when `details` is sparse.
fn extract_reply(value: &Value) -> Option<String> {
    let parsed: InvokeResult = serde_json::from_value(value.clone()).ok()?;
    let mut details = parsed.result.details;

    if details.status.is_none() {
        if let Some(block) = parsed.result.content.first() {
            if block.kind == "text" {
                if let Ok(inner) = serde_json::from_str::<Details>(&block.text) {
                    details = inner;
                }
            }
        }
    }

    if details.status.as_deref() == Some("ok") {
        details.reply.filter(|r| !r.is_empty())
    } else {
        None
    }
}

fn session_key_present(value: &Value, session_key: &str) -> bool {
    // Primary path: result.content[0].text is a JSON string {"sessions": [...]}.
    if let Some(text) = value
        .pointer("/result/content/0/text")
        .and_then(Value::as_str)
    {
        if let Ok(inner) = serde_json::from_str::<Value>(text) {
            if sessions_contain(&inner, "sessions", session_key) {
                return true;
            }
        }
    }
    // Fallback: result.details.sessions.
    value
        .pointer("/result/details")
        .is_some_and(|details| sessions_contain(details, "sessions", session_key))
}

fn sessions_contain(value: &Value, field: &str, session_key: &str) -> bool {
    let Some(sessions) = value.get(field).and_then(Value::as_array) else {
        return false;
    };
    sessions.iter().any(|s| {
        s.get("key").and_then(Value::as_str) == Some(session_key)
            || s.get("sessionKey").and_then(Value::as_str) == Some(session_key)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(gateway_url: &str) -> BridgeConfig {
        BridgeConfig {
            mailbox_server_url: "relay.example.com".to_string(),
            mailbox_api_key: "amb_test".to_string(),
            openclaw_gateway_url: gateway_url.to_string(),
            openclaw_gateway_token: "tok".to_string(),
            trusted_agents: Vec::new(),
            agent_reply_timeout: 300,
            openclaw_hooks_url: None,
            openclaw_hooks_token: None,
            log_json: false,
        }
    }

    #[test]
    fn extract_reply_reads_details() {
        let value = json!({"result": {"details": {"status": "ok", "reply": "hello"}}});
        assert_eq!(extract_reply(&value), Some("hello".to_string()));
    }

    #[test]
    fn extract_reply_falls_back_to_content_text() {
        let inner = json!({"status": "ok", "reply": "from content"}).to_string();
        let value = json!({"result": {"content": [{"type": "text", "text": inner}]}});
        assert_eq!(extract_reply(&value), Some("from content".to_string()));
    }

    #[test]
    fn extract_reply_none_on_timeout_status() {
        let value = json!({"result": {"details": {"status": "timeout"}}});
        assert_eq!(extract_reply(&value), None);
    }

    #[test]
    fn session_key_present_checks_content_path() {
        let inner = json!({"sessions": [{"key": "agent:main:dm:mailbox-bob"}]}).to_string();
        let value = json!({"result": {"content": [{"type": "text", "text": inner}]}});
        assert!(session_key_present(&value, "agent:main:dm:mailbox-bob"));
        assert!(!session_key_present(&value, "agent:main:dm:mailbox-carol"));
    }

    #[tokio::test]
    async fn inject_and_wait_returns_reply_on_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tools/invoke")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":{"details":{"status":"ok","reply":"hi there"}}}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(&config(&server.url()));
        let reply = client
            .inject_and_wait("agent:main:dm:mailbox-bob", "hello", Duration::from_secs(5))
            .await;
        assert_eq!(reply, Some("hi there".to_string()));
    }

    #[tokio::test]
    async fn inject_and_wait_returns_none_on_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tools/invoke")
            .with_status(404)
            .create_async()
            .await;

        let client = GatewayClient::new(&config(&server.url()));
        let reply = client
            .inject_and_wait("session", "hello", Duration::from_secs(5))
            .await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn is_local_session_true_when_key_listed() {
        let mut server = mockito::Server::new_async().await;
        let inner = json!({"sessions": [{"key": "agent:main:dm:mailbox-bob"}]}).to_string();
        server
            .mock("POST", "/tools/invoke")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"result": {"content": [{"type": "text", "text": inner}]}}).to_string(),
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&config(&server.url()));
        assert!(client.is_local_session("agent:main:dm:mailbox-bob").await);
        assert!(!client.is_local_session("agent:main:dm:mailbox-carol").await);
    }

    #[tokio::test]
    async fn deliver_to_local_falls_back_without_hooks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tools/invoke")
            .match_body(mockito::Matcher::PartialJson(
                json!({"tool": "sessions_send"}),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = GatewayClient::new(&config(&server.url()));
        client.deliver_to_local("session", "reply arrived").await;
        mock.assert_async().await;
    }
}
