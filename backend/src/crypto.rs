//! Encryption at rest for OAuth tokens.
//!
//! Tokens are encrypted with AES-256-GCM before they touch the mailboxes
//! table and decrypted just before a Gmail client is built from them.
//! Wire format: base64(nonce || ciphertext).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn new(key_b64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_b64)
            .context("ENCRYPTION_KEY must be valid base64")?;
        if key_bytes.len() != 32 {
            bail!("ENCRYPTION_KEY must decode to exactly 32 bytes");
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Ok(Self { cipher })
    }

    /// Encrypt a token. Empty input passes through as an empty string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("token encryption failed"))?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a token. Empty input passes through as an empty string.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let raw = BASE64
            .decode(encoded)
            .context("stored token is not valid base64")?;
        if raw.len() <= NONCE_LEN {
            bail!("stored token is too short to contain a nonce");
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("token decryption failed"))?;

        String::from_utf8(plaintext).context("decrypted token is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new(&BASE64.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = test_cipher();
        let token = "ya29.a0AfH6SMBexample-access-token";

        let encrypted = cipher.encrypt(token).unwrap();
        assert_ne!(encrypted, token);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), token);
    }

    #[test]
    fn empty_string_passes_through() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn nonces_are_unique_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-token").unwrap();
        let b = cipher.encrypt("same-token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let cipher = test_cipher();
        let mut raw = BASE64.decode(cipher.encrypt("refresh-token").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;

        assert!(cipher.decrypt(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let cipher = test_cipher();
        let other = TokenCipher::new(&BASE64.encode([8u8; 32])).unwrap();

        let encrypted = cipher.encrypt("refresh-token").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(TokenCipher::new(&BASE64.encode([1u8; 16])).is_err());
        assert!(TokenCipher::new("not base64!!").is_err());
    }
}
