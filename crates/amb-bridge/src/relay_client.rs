//! HTTP client the bridge uses to post replies back to the relay.
//!
//! Posting a reply is the only relay write the bridge daemon itself
//! performs — every other tool-surface call (`register`,
//! `request_connection`, ...) belongs to a separate CLI shim.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    pub to: &'a str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_session_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub session_id: String,
}

/// Thin client against the relay's HTTP API, authenticated with the
/// bridge's `X-API-Key`.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RelayClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// `POST /messages/send` — used by the bridge to post a reply back into
    /// the thread it was dispatched from.
    pub async fn send_message(
        &self,
        body: &SendMessageRequest<'_>,
    ) -> Result<SendMessageResponse, BridgeError> {
        let resp = self
            .http
            .post(format!("{}/messages/send", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_message_posts_expected_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages/send")
            .match_header("x-api-key", "amb_test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": "bob",
                "content": "hi",
                "session_id": "s1",
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message_id":"m1","session_id":"s1"}"#)
            .create_async()
            .await;

        let client = RelayClient::new(server.url(), "amb_test".to_string()).unwrap();
        let resp = client
            .send_message(&SendMessageRequest {
                to: "bob",
                content: "hi",
                subject: None,
                session_id: Some("s1"),
                reply_to_session_key: None,
                room: None,
            })
            .await
            .unwrap();

        assert_eq!(resp.message_id, "m1");
        assert_eq!(resp.session_id, "s1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_message_surfaces_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages/send")
            .with_status(403)
            .create_async()
            .await;

        let client = RelayClient::new(server.url(), "amb_test".to_string()).unwrap();
        let err = client
            .send_message(&SendMessageRequest {
                to: "bob",
                content: "hi",
                subject: None,
                session_id: None,
                reply_to_session_key: None,
                room: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Http(_)));
    }
}
