//! AES-256-GCM encryption for stored connection tokens.
//!
//! Each token is sealed separately with its own random nonce. The master key is
//! 32 bytes, supplied base64-encoded from the environment.

use crate::error::{ConnectError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// A token sealed for storage: base64 ciphertext plus the base64 nonce used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedToken {
    pub ciphertext: String,
    pub nonce: String,
}

/// Reversible, authenticated transform applied to token fields at the
/// storage boundary.
///
/// Connections and API clients never see this key.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64)
            .map_err(|e| ConnectError::InvalidKey(format!("not valid base64: {}", e)))?;
        Self::from_key_bytes(&key_bytes)
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(ConnectError::InvalidKey(format!(
                "key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ConnectError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random key, base64-encoded.
    pub fn generate_key() -> String {
        BASE64.encode(Aes256Gcm::generate_key(&mut OsRng))
    }

    /// Encrypt a token under a fresh random nonce (never reused).
    pub fn seal(&self, plaintext: &str) -> Result<SealedToken> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| ConnectError::Encryption(e.to_string()))?;

        Ok(SealedToken {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
        })
    }

    /// Decrypt a sealed token.
    ///
    /// Fails on a wrong key, a mismatched nonce, or tampered ciphertext; the
    /// authentication tag is always checked.
    pub fn open(&self, ciphertext: &str, nonce: &str) -> Result<String> {
        let ciphertext_bytes = BASE64
            .decode(ciphertext)
            .map_err(|e| ConnectError::Decryption(format!("ciphertext is not valid base64: {}", e)))?;
        let nonce_bytes = BASE64
            .decode(nonce)
            .map_err(|e| ConnectError::Decryption(format!("nonce is not valid base64: {}", e)))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(ConnectError::Decryption(format!(
                "invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext_bytes.as_ref())
            .map_err(|_| ConnectError::Decryption("wrong key or corrupted data".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| ConnectError::Decryption("decrypted data is not valid UTF-8".to_string()))
    }

    pub(crate) fn seal_optional(&self, plaintext: Option<&str>) -> Result<Option<SealedToken>> {
        plaintext.map(|p| self.seal(p)).transpose()
    }

    pub(crate) fn open_optional(
        &self,
        ciphertext: Option<String>,
        nonce: Option<String>,
    ) -> Result<Option<String>> {
        match (ciphertext, nonce) {
            (Some(ciphertext), Some(nonce)) => self.open(&ciphertext, &nonce).map(Some),
            (None, None) => Ok(None),
            _ => Err(ConnectError::Decryption(
                "ciphertext stored without its nonce".to_string(),
            )),
        }
    }
}
