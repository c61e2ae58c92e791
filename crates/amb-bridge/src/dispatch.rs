//! Per-message routing: decides whether an incoming push event should be
//! injected into the local executor or dropped as a loop-back, and frames
//! replies before handing them to the relay client.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::events::ServerEvent;
use crate::executor::GatewayClient;
use crate::framing::{
    extract_reply_text, format_incoming_message, sanitize_from_agent, sanitize_room,
    sanitize_subject, trust_label,
};
use crate::relay_client::{RelayClient, SendMessageRequest};

/// Holds the collaborators and per-thread state the bridge needs to route
/// one `new_message` event at a time. Cheap to clone — shared across the
/// tasks spawned per inbound event.
#[derive(Clone)]
pub struct Dispatcher {
    config: BridgeConfig,
    relay: RelayClient,
    executor: GatewayClient,
    session_map: std::sync::Arc<Mutex<HashMap<String, String>>>,
}

impl Dispatcher {
    pub fn new(config: BridgeConfig, relay: RelayClient, executor: GatewayClient) -> Self {
        Self {
            config,
            relay,
            executor,
            session_map: std::sync::Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Entry point for every event read off the push channel. Only
    /// `new_message` carries routing work; the rest are purely informational.
    pub async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage {
                session_id,
                subject,
                from_agent,
                content,
                message_id,
                reply_to_session_key,
                room,
                ..
            } => {
                self.handle_new_message(
                    &session_id,
                    &subject,
                    &from_agent,
                    &content,
                    &message_id,
                    reply_to_session_key.as_deref(),
                    room.as_deref(),
                )
                .await;
            }
            ServerEvent::ConnectionRequest {
                from_agent, message, ..
            } => {
                info!(
                    from_agent,
                    message = message.as_deref().unwrap_or(""),
                    "connection request received"
                );
            }
            ServerEvent::ConnectionApproved { connected_agent, .. } => {
                info!(connected_agent, "connection approved");
            }
            ServerEvent::AuthOk { agent } => {
                info!(agent, "authenticated with relay");
            }
            ServerEvent::Pong => {}
        }
    }

    async fn handle_new_message(
        &self,
        session_id: &str,
        subject: &str,
        from_agent_raw: &str,
        content: &str,
        message_id: &str,
        reply_to_session_key: Option<&str>,
        room_raw: Option<&str>,
    ) {
        let from_agent = sanitize_from_agent(from_agent_raw);
        let subject = sanitize_subject(subject);
        let room = sanitize_room(room_raw);

        let local_session = self.choose_local_session(session_id, &from_agent, room.as_deref());

        // Loop-break check: a reply addressed back into one of our own
        // local sessions is the owner's context, not the other agent's —
        // surface it and stop, never re-post.
        if let Some(reply_key) = reply_to_session_key {
            if self.executor.is_local_session(reply_key).await {
                info!(
                    message_id,
                    session_id, reply_key, "loop-break: delivering to local owner session"
                );
                self.executor.deliver_to_local(reply_key, content).await;
                return;
            }
        }

        let trust = trust_label(&from_agent, &self.config.trusted_agents_lower());
        let formatted =
            format_incoming_message(&from_agent, trust, &subject, room.as_deref(), session_id, content);

        let raw_reply = self
            .executor
            .inject_and_wait(&local_session, &formatted, self.config.reply_timeout())
            .await;

        let Some(raw_reply) = raw_reply else {
            warn!(message_id, session_id, "no reply from local executor, dropping");
            return;
        };
        let reply = extract_reply_text(&raw_reply);
        if reply.is_empty() {
            warn!(message_id, session_id, "executor reply was empty after extraction, dropping");
            return;
        }

        let request = SendMessageRequest {
            to: &from_agent,
            content: &reply,
            subject: None,
            session_id: Some(session_id),
            reply_to_session_key,
            room: room.as_deref(),
        };
        if let Err(e) = self.relay.send_message(&request).await {
            warn!(message_id, session_id, error = %e, "failed to post reply back to relay");
        }
    }

    /// Picks (and caches) which local executor session a given mailbox
    /// session should be injected into.
    fn choose_local_session(&self, session_id: &str, from_agent: &str, room: Option<&str>) -> String {
        let mut map = self.session_map.lock().expect("session_map mutex poisoned");
        if let Some(existing) = map.get(session_id) {
            return existing.clone();
        }
        let chosen = if let Some(room) = room {
            format!("agent:main:dm:mailbox-room-{room}")
        } else {
            let short_id: String = session_id.chars().take(8).collect();
            format!("agent:main:dm:mailbox-{from_agent}-{short_id}")
        };
        map.insert(session_id.to_string(), chosen.clone());
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig {
            mailbox_server_url: "relay.example.com".to_string(),
            mailbox_api_key: "amb_test".to_string(),
            openclaw_gateway_url: "http://127.0.0.1:18789".to_string(),
            openclaw_gateway_token: "tok".to_string(),
            trusted_agents: Vec::new(),
            agent_reply_timeout: 300,
            openclaw_hooks_url: None,
            openclaw_hooks_token: None,
            log_json: false,
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            config(),
            RelayClient::new("http://127.0.0.1:1".to_string(), "amb_test".to_string()).unwrap(),
            GatewayClient::new(&config()),
        )
    }

    #[test]
    fn choose_local_session_prefers_room_then_reuses_cache() {
        let d = dispatcher();
        let first = d.choose_local_session("sess12345678", "bob", Some("general"));
        assert_eq!(first, "agent:main:dm:mailbox-room-general");
        // Second call with the same session_id reuses the cached choice even
        // without a room, proving session_map is consulted first.
        let second = d.choose_local_session("sess12345678", "bob", None);
        assert_eq!(second, first);
    }

    #[test]
    fn choose_local_session_falls_back_to_per_thread_key() {
        let d = dispatcher();
        let key = d.choose_local_session("sessionid12345", "bob", None);
        assert_eq!(key, "agent:main:dm:mailbox-bob-sessioni");
    }

    #[tokio::test]
    async fn loop_back_reply_is_delivered_locally_and_never_reposted() {
        let mut gateway = mockito::Server::new_async().await;
        let relay = mockito::Server::new_async().await;

        let owner_session = "agent:main:dm:mailbox-alice-abcd1234";
        let listing = serde_json::json!({"sessions": [{"key": owner_session}]}).to_string();
        gateway
            .mock("POST", "/tools/invoke")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"tool": "sessions_list"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({"result": {"content": [{"type": "text", "text": listing}]}})
                    .to_string(),
            )
            .create_async()
            .await;
        let delivery_mock = gateway
            .mock("POST", "/tools/invoke")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"tool": "sessions_send"}),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        // `/messages/send` must never be hit on this path.
        let relay_mock = relay
            .mock("POST", "/messages/send")
            .expect(0)
            .create_async()
            .await;

        let mut cfg = config();
        cfg.openclaw_gateway_url = gateway.url();
        let d = Dispatcher::new(
            cfg,
            RelayClient::new(relay.url(), "amb_test".to_string()).unwrap(),
            GatewayClient::new(&BridgeConfig {
                openclaw_gateway_url: gateway.url(),
                ..config()
            }),
        );

        d.handle_event(ServerEvent::NewMessage {
            session_id: "sess-other".to_string(),
            subject: "re: hi".to_string(),
            from_agent: "bob".to_string(),
            content: "here is my reply".to_string(),
            message_id: "msg-1".to_string(),
            created_at: chrono::Utc::now(),
            reply_to_session_key: Some(owner_session.to_string()),
            room: None,
        })
        .await;

        delivery_mock.assert_async().await;
        relay_mock.assert_async().await;
    }
}
