//! Content-at-rest encryption for mailbox messages.
//!
//! Message content is encrypted with a single process-wide symmetric key
//! so the relay can store and later re-deliver historical messages
//! without holding open per-agent crypto state. Decryption never fails
//! outward: a token that doesn't parse, or doesn't authenticate, is
//! returned unchanged, so content written before a key rotation (or never
//! encrypted at all) still round-trips.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::CryptoError;

const VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;

/// Encrypts and decrypts mailbox message content with a fixed process key.
pub struct ContentCipher {
    cipher: ChaCha20Poly1305,
}

impl ContentCipher {
    /// Build a cipher from a raw 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        Self { cipher }
    }

    /// Parse a 32-byte key from a hex string (as read from an env var).
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: v.len(),
            })?;
        Ok(Self::new(key))
    }

    /// Generate a random key, for ephemeral startup use when none is configured.
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt `plaintext`, returning a base64 envelope: version || nonce || ciphertext+tag.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        #[allow(clippy::expect_used)]
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .expect("chacha20poly1305 encryption is infallible for well-formed keys/nonces");

        let mut envelope = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        envelope.push(VERSION);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        BASE64.encode(envelope)
    }

    /// Decrypt `token`. On any failure to parse or authenticate, returns
    /// `token` unchanged rather than an error — this lets content written
    /// under a previous key, or never encrypted at all, keep reading back.
    pub fn decrypt(&self, token: &str) -> String {
        self.try_decrypt(token).unwrap_or_else(|| token.to_string())
    }

    fn try_decrypt(&self, token: &str) -> Option<String> {
        let envelope = BASE64.decode(token).ok()?;
        if envelope.len() < 1 + NONCE_SIZE {
            return None;
        }
        if envelope[0] != VERSION {
            return None;
        }
        let nonce = Nonce::from_slice(&envelope[1..1 + NONCE_SIZE]);
        let ciphertext = &envelope[1 + NONCE_SIZE..];
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cipher = ContentCipher::new([7u8; 32]);
        let token = cipher.encrypt("hello from agent-a");
        assert_eq!(cipher.decrypt(&token), "hello from agent-a");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let cipher = ContentCipher::new([1u8; 32]);
        let token = cipher.encrypt("");
        assert_eq!(cipher.decrypt(&token), "");
    }

    #[test]
    fn decrypt_of_plain_legacy_text_returns_input_unchanged() {
        let cipher = ContentCipher::new([3u8; 32]);
        assert_eq!(cipher.decrypt("just plain text"), "just plain text");
    }

    #[test]
    fn decrypt_with_wrong_key_returns_input_unchanged() {
        let a = ContentCipher::new([9u8; 32]);
        let b = ContentCipher::new([10u8; 32]);
        let token = a.encrypt("secret");
        assert_eq!(b.decrypt(&token), token);
    }

    #[test]
    fn decrypt_of_tampered_token_returns_input_unchanged() {
        let cipher = ContentCipher::new([5u8; 32]);
        let mut token = cipher.encrypt("tamper me");
        token.push('x');
        assert_eq!(cipher.decrypt(&token), token);
    }

    #[test]
    fn from_hex_roundtrips() {
        let hex_key = "00".repeat(32);
        let cipher = ContentCipher::from_hex(&hex_key).unwrap();
        let token = cipher.encrypt("via hex key");
        assert_eq!(cipher.decrypt(&token), "via hex key");
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ContentCipher::from_hex("00112233").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength { .. }));
    }
}
