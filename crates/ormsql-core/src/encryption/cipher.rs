//! Property ciphers.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::error::Error;

/// AES-256-GCM nonce size (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;
/// AES-256 key size (256 bits = 32 bytes)
const KEY_SIZE: usize = 32;
/// Context string for passphrase key derivation.
const KEY_CONTEXT: &str = "ormsql 2024 property encryption key";

/// Encrypts and decrypts individual string properties.
pub trait PropertyCipher: Send + Sync {
    /// Encrypt clear text into its stored form.
    fn encrypt(&self, plaintext: &str) -> Result<String, Error>;

    /// Decrypt a stored value back to clear text.
    fn decrypt(&self, stored: &str) -> Result<String, Error>;
}

/// AES-256-GCM with a random nonce per value.
///
/// Stored form is base64 of `nonce || ciphertext`, so the same clear text
/// encrypts differently every time.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Configuration(format!("failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Create from a base64-encoded key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, Error> {
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(|e| Error::Configuration(format!("invalid base64 key: {e}")))?;
        Self::new(&key)
    }

    /// Derive the key from a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, Error> {
        let key = blake3::derive_key(KEY_CONTEXT, passphrase.as_bytes());
        Self::new(&key)
    }

    /// Generate a random base64 key (for initial setup).
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

impl PropertyCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Encryption(format!("encryption failed: {e}")))?;

        let mut stored = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        stored.extend_from_slice(&nonce_bytes);
        stored.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(stored))
    }

    fn decrypt(&self, stored: &str) -> Result<String, Error> {
        let bytes = BASE64
            .decode(stored)
            .map_err(|e| Error::Encryption(format!("invalid encrypted data: {e}")))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(Error::Encryption(format!(
                "encrypted data too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::Encryption(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Encryption(format!("invalid UTF-8 in decrypted data: {e}")))
    }
}

// Implement Debug without exposing the cipher
impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}
