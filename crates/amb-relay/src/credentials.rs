//! API key issuance and verification.
//!
//! Keys are `amb_` followed by 64 hex characters. Only a SHA-256 hash and an
//! 8-character prefix of the full token are ever persisted; the raw key is
//! returned to the caller exactly once, at registration time.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::storage::{Agent, RelayDatabase, queries};

const KEY_PREFIX_LEN: usize = 8;

/// Generate a fresh `amb_<64-hex>` API key.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("amb_{}", hex::encode(bytes))
}

/// Hash a raw API key for storage (we never store raw tokens).
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The prefix of a raw key shown back to agents so they can recognize which
/// key is which without the relay ever re-exposing the full value.
pub fn key_prefix(raw_key: &str) -> &str {
    &raw_key[..raw_key.len().min(KEY_PREFIX_LEN)]
}

/// Verification code format: two uppercase letters, a dash, three digits
/// (`AA-123`), generated by rejection sampling against existing codes.
pub async fn generate_verification_code(db: &RelayDatabase) -> Result<String, ApiError> {
    const MAX_ATTEMPTS: u32 = 10;
    for _ in 0..MAX_ATTEMPTS {
        let code = random_code();
        if !queries::verification_code_exists(db.pool(), &code).await? {
            return Ok(code);
        }
    }
    Err(ApiError::Internal(
        "failed to generate a unique verification code".to_string(),
    ))
}

fn random_code() -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"0123456789";
    let mut rng = rand::rng();
    let a = LETTERS[(rng.next_u32() as usize) % LETTERS.len()] as char;
    let b = LETTERS[(rng.next_u32() as usize) % LETTERS.len()] as char;
    let d1 = DIGITS[(rng.next_u32() as usize) % DIGITS.len()] as char;
    let d2 = DIGITS[(rng.next_u32() as usize) % DIGITS.len()] as char;
    let d3 = DIGITS[(rng.next_u32() as usize) % DIGITS.len()] as char;
    format!("{a}{b}-{d1}{d2}{d3}")
}

/// Authenticate a raw API key against the store, returning the matching agent.
pub async fn authenticate(db: &RelayDatabase, raw_key: &str) -> Result<Agent, ApiError> {
    let hash = hash_api_key(raw_key);
    queries::get_agent_by_api_key_hash(db.pool(), &hash)
        .await?
        .ok_or(ApiError::AuthInvalid)
}
