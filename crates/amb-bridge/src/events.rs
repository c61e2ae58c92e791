//! Push-channel event frames sent by the relay.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthOk {
        agent: String,
    },
    NewMessage {
        session_id: String,
        subject: String,
        from_agent: String,
        content: String,
        message_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
        #[serde(default)]
        reply_to_session_key: Option<String>,
        #[serde(default)]
        room: Option<String>,
    },
    ConnectionRequest {
        connection_id: String,
        from_agent: String,
        #[serde(default)]
        message: Option<String>,
        verification_code: String,
    },
    ConnectionApproved {
        connection_id: String,
        connected_agent: String,
    },
    Pong,
}
