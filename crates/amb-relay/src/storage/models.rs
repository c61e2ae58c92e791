//! Data models for the agent mailbox relay's storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub api_key_hash: String,
    pub api_key_prefix: String,
    pub owner_contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Connection lifecycle status values.
pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Connection {
    pub id: String,
    pub requester_id: String,
    pub target_id: Option<String>,
    pub target_agent_name: String,
    pub status: String,
    pub verification_code: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub subject: String,
    pub initiator_id: String,
    pub participant_id: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl Session {
    pub fn participates(&self, agent_id: &str) -> bool {
        self.initiator_id == agent_id || self.participant_id == agent_id
    }

    pub fn other(&self, agent_id: &str) -> &str {
        if self.initiator_id == agent_id {
            &self.participant_id
        } else {
            &self.initiator_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub reply_to_session_key: Option<String>,
    pub room: Option<String>,
    pub created_at: DateTime<Utc>,
}
