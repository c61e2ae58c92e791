//! Queries backing the relay's HTTP handlers.
//!
//! Every function takes an `impl Executor<Database = Sqlite>` so callers can run a
//! single write endpoint's queries inside one `Transaction`
//! while read-only endpoints can pass the pool directly.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, Sqlite};

use amb_core::db::DatabaseError;

use super::models::{Agent, Connection, Message, STATUS_ACTIVE, STATUS_PENDING, Session};

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

pub async fn insert_agent<'a, E>(
    exec: E,
    id: &str,
    name: &str,
    api_key_hash: &str,
    api_key_prefix: &str,
    owner_contact: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO agents (id, name, api_key_hash, api_key_prefix, owner_contact, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(api_key_hash)
    .bind(api_key_prefix)
    .bind(owner_contact)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_agent_by_name<'a, E>(exec: E, name: &str) -> Result<Option<Agent>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(exec)
            .await?,
    )
}

pub async fn get_agent_by_id<'a, E>(exec: E, id: &str) -> Result<Option<Agent>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?,
    )
}

pub async fn get_agent_by_api_key_hash<'a, E>(
    exec: E,
    hash: &str,
) -> Result<Option<Agent>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE api_key_hash = ?")
            .bind(hash)
            .fetch_optional(exec)
            .await?,
    )
}

/// Batch-resolve agents by id, avoiding per-row lookups when resolving
/// sender names for `/inbox` and `/sessions/*/history`.
pub async fn get_agents_by_ids<'a, E>(exec: E, ids: &[String]) -> Result<Vec<Agent>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat_n("?", ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("SELECT * FROM agents WHERE id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, Agent>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(exec).await?)
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

pub async fn insert_connection<'a, E>(
    exec: E,
    id: &str,
    requester_id: &str,
    target_agent_name: &str,
    verification_code: &str,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    let expires_at = now + Duration::hours(1);
    sqlx::query(
        "INSERT INTO connections
            (id, requester_id, target_id, target_agent_name, status, verification_code,
             message, created_at, updated_at, expires_at)
         VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(requester_id)
    .bind(target_agent_name)
    .bind(STATUS_PENDING)
    .bind(verification_code)
    .bind(message)
    .bind(now)
    .bind(now)
    .bind(expires_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_connection_by_code<'a, E>(
    exec: E,
    code: &str,
) -> Result<Option<Connection>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE verification_code = ? AND status = ?",
    )
    .bind(code)
    .bind(STATUS_PENDING)
    .fetch_optional(exec)
    .await?)
}

pub async fn verification_code_exists<'a, E>(exec: E, code: &str) -> Result<bool, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM connections WHERE verification_code = ?")
        .bind(code)
        .fetch_optional(exec)
        .await?;
    Ok(row.is_some())
}

/// Any ACTIVE connection between the unordered pair `{a, b}`, checked via
/// the `target_agent_name` snapshot (used before a target id is known to us).
pub async fn find_active_connection_between<'a, E>(
    exec: E,
    a_id: &str,
    a_name: &str,
    b_id: &str,
    b_name: &str,
) -> Result<Option<Connection>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections
         WHERE status = ?
           AND ((requester_id = ? AND target_agent_name = ?)
                OR (requester_id = ? AND target_agent_name = ?))",
    )
    .bind(STATUS_ACTIVE)
    .bind(a_id)
    .bind(b_name)
    .bind(b_id)
    .bind(a_name)
    .fetch_optional(exec)
    .await?)
}

/// Any ACTIVE connection between two already-resolved agent ids (used by
/// `/connections/approve`'s reverse-direction guard, so approving a request
/// that duplicates an already-approved connection in the other direction
/// is rejected).
pub async fn find_active_connection_between_ids<'a, E>(
    exec: E,
    a_id: &str,
    b_id: &str,
) -> Result<Option<Connection>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections
         WHERE status = ?
           AND ((requester_id = ? AND target_id = ?)
                OR (requester_id = ? AND target_id = ?))",
    )
    .bind(STATUS_ACTIVE)
    .bind(a_id)
    .bind(b_id)
    .bind(b_id)
    .bind(a_id)
    .fetch_optional(exec)
    .await?)
}

/// Any live (unexpired) PENDING connection between the unordered pair `{a, b}`.
pub async fn find_pending_connection_between<'a, E>(
    exec: E,
    a_id: &str,
    a_name: &str,
    b_id: &str,
    b_name: &str,
    now: DateTime<Utc>,
) -> Result<Option<Connection>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections
         WHERE status = ? AND expires_at > ?
           AND ((requester_id = ? AND target_agent_name = ?)
                OR (requester_id = ? AND target_agent_name = ?))",
    )
    .bind(STATUS_PENDING)
    .bind(now)
    .bind(a_id)
    .bind(b_name)
    .bind(b_id)
    .bind(a_name)
    .fetch_optional(exec)
    .await?)
}

/// Count of the requester's currently live PENDING connections, capped
/// at 3 outstanding requests per requester.
pub async fn count_live_pending_for_requester<'a, E>(
    exec: E,
    requester_id: &str,
    now: DateTime<Utc>,
) -> Result<i64, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM connections
         WHERE requester_id = ? AND status = ? AND expires_at > ?",
    )
    .bind(requester_id)
    .bind(STATUS_PENDING)
    .bind(now)
    .fetch_one(exec)
    .await?;
    Ok(row.0)
}

pub async fn approve_connection<'a, E>(
    exec: E,
    connection_id: &str,
    target_id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    sqlx::query("UPDATE connections SET target_id = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(target_id)
        .bind(STATUS_ACTIVE)
        .bind(now)
        .bind(connection_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Live PENDING connections naming `agent_name` as either side, newest first.
pub async fn list_live_pending_for_agent<'a, E>(
    exec: E,
    agent_id: &str,
    agent_name: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Connection>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections
         WHERE status = ? AND expires_at > ?
           AND (requester_id = ? OR target_agent_name = ?)
         ORDER BY created_at DESC",
    )
    .bind(STATUS_PENDING)
    .bind(now)
    .bind(agent_id)
    .bind(agent_name)
    .fetch_all(exec)
    .await?)
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub async fn get_session_by_id<'a, E>(exec: E, id: &str) -> Result<Option<Session>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?,
    )
}

/// Find the session for a case-folded subject between the unordered pair
/// `{a, b}` — the find-or-create key for direct-message sessions.
pub async fn find_session_by_subject<'a, E>(
    exec: E,
    subject_lower: &str,
    a_id: &str,
    b_id: &str,
) -> Result<Option<Session>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions
         WHERE lower(subject) = ?
           AND ((initiator_id = ? AND participant_id = ?)
                OR (initiator_id = ? AND participant_id = ?))",
    )
    .bind(subject_lower)
    .bind(a_id)
    .bind(b_id)
    .bind(b_id)
    .bind(a_id)
    .fetch_optional(exec)
    .await?)
}

pub async fn insert_session<'a, E>(
    exec: E,
    id: &str,
    subject: &str,
    initiator_id: &str,
    participant_id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO sessions (id, subject, initiator_id, participant_id, created_at, last_message_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(subject)
    .bind(initiator_id)
    .bind(participant_id)
    .bind(now)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn touch_session_last_message_at<'a, E>(
    exec: E,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    sqlx::query("UPDATE sessions SET last_message_at = ? WHERE id = ?")
        .bind(now)
        .bind(session_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Sessions `agent_id` participates in, newest-activity first.
pub async fn list_sessions_for_agent<'a, E>(
    exec: E,
    agent_id: &str,
) -> Result<Vec<Session>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions
         WHERE initiator_id = ? OR participant_id = ?
         ORDER BY last_message_at DESC",
    )
    .bind(agent_id)
    .bind(agent_id)
    .fetch_all(exec)
    .await?)
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
pub async fn insert_message<'a, E>(
    exec: E,
    id: &str,
    session_id: &str,
    sender_id: &str,
    encrypted_content: &str,
    reply_to_session_key: Option<&str>,
    room: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO messages
            (id, session_id, sender_id, content, is_read, reply_to_session_key, room, created_at)
         VALUES (?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(id)
    .bind(session_id)
    .bind(sender_id)
    .bind(encrypted_content)
    .bind(reply_to_session_key)
    .bind(room)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

/// Count of unread messages in `session_id` not sent by `agent_id`.
pub async fn count_unread<'a, E>(
    exec: E,
    session_id: &str,
    agent_id: &str,
) -> Result<i64, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM messages WHERE session_id = ? AND sender_id != ? AND is_read = 0",
    )
    .bind(session_id)
    .bind(agent_id)
    .fetch_one(exec)
    .await?;
    Ok(row.0)
}

/// Last `limit` messages in `session_id`, newest first (callers reverse for
/// chronological display).
pub async fn recent_messages<'a, E>(
    exec: E,
    session_id: &str,
    limit: i64,
) -> Result<Vec<Message>, DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE session_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(exec)
    .await?)
}

/// Mark every message in `message_ids` as read. A no-op for an empty slice.
pub async fn mark_messages_read<'a, E>(
    exec: E,
    message_ids: &[String],
) -> Result<(), DatabaseError>
where
    E: Executor<'a, Database = Sqlite>,
{
    if message_ids.is_empty() {
        return Ok(());
    }
    let placeholders = std::iter::repeat_n("?", message_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("UPDATE messages SET is_read = 1 WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in message_ids {
        query = query.bind(id);
    }
    query.execute(exec).await?;
    Ok(())
}
