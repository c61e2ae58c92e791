//! Content-at-rest encryption for the agent mailbox relay.
//!
//! ChaCha20-Poly1305 AEAD under a single process-wide key, with a
//! legacy-plaintext fallback on decrypt so message content written under a
//! previous (or no) key keeps reading back unchanged.

pub mod content;
pub mod error;

pub use content::ContentCipher;
pub use error::CryptoError;
