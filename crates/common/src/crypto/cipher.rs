//! AES-256-GCM cipher for short secrets such as CalDAV passwords.
//!
//! Ciphertexts are encoded as base64 of `nonce || ciphertext` so they fit in a
//! single text column.
//!
//! ```rust
//! use busysync_common::crypto::SecretCipher;
//!
//! let cipher = SecretCipher::new(&SecretCipher::generate_key())?;
//! let stored = cipher.encrypt_to_string("app-password")?;
//! assert_eq!(cipher.decrypt_to_string(&stored)?, "app-password");
//! # Ok::<(), busysync_common::error::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::error::{CommonError, CommonResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing for credentials stored at rest.
///
/// Ciphertext is `base64(nonce || ciphertext)` with a fresh random nonce per call.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").field("key", &"[REDACTED]").finish()
    }
}

impl SecretCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> CommonResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CommonError::config("secret_key", "key must be exactly 32 bytes"));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CommonError::crypto(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64 encoded key.
    pub fn from_base64_key(encoded: &str) -> CommonResult<Self> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| CommonError::config("secret_key", format!("invalid base64: {e}")))?;
        Self::new(&key)
    }

    /// Random 32-byte key.
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt `plaintext` and encode the result as base64.
    pub fn encrypt_to_string(&self, plaintext: &str) -> CommonResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CommonError::crypto(format!("Encryption failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// Reverse of [`encrypt_to_string`](Self::encrypt_to_string).
    ///
    /// # Errors
    /// Returns `CommonError::Crypto` for bad encoding, truncated payloads, or a
    /// wrong key.
    pub fn decrypt_to_string(&self, encoded: &str) -> CommonResult<String> {
        let payload = BASE64
            .decode(encoded.trim())
            .map_err(|e| CommonError::crypto(format!("Invalid ciphertext encoding: {e}")))?;
        if payload.len() <= NONCE_LEN {
            return Err(CommonError::crypto("Ciphertext too short"));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CommonError::crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| CommonError::crypto(format!("Decrypted secret is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypts_with_fresh_nonces() {
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let a = cipher.encrypt_to_string("hunter2").unwrap();
        let b = cipher.encrypt_to_string("hunter2").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt_to_string(&a).unwrap(), "hunter2");
        assert_eq!(cipher.decrypt_to_string(&b).unwrap(), "hunter2");
    }

    #[test]
    fn rejects_wrong_key() {
        let stored = SecretCipher::new(&SecretCipher::generate_key())
            .unwrap()
            .encrypt_to_string("secret")
            .unwrap();
        let other = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        assert!(matches!(other.decrypt_to_string(&stored), Err(CommonError::Crypto(_))));
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(SecretCipher::new(&[0u8; 16]), Err(CommonError::Config { .. })));
        assert!(SecretCipher::from_base64_key("not base64!").is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let cipher = SecretCipher::new(&SecretCipher::generate_key()).unwrap();
        let short = BASE64.encode([1u8; 4]);
        assert!(cipher.decrypt_to_string(&short).is_err());
    }
}
