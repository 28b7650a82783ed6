//! At-rest encryption of third-party API keys.
//!
//! Keys are sealed with AES-256-GCM. The cipher key is the SHA-256 of the
//! server `SECRET_KEY` plus a fixed context string, so rotating the server
//! secret invalidates every stored key. The stored form is
//! `base64([12-byte nonce][ciphertext + tag])`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use sha2::{Digest, Sha256};

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const KEY_CONTEXT: &[u8] = b"retina:ai-model-api-keys";

/// Masking character for displayed API keys.
const MASK_CHAR: char = '\u{2022}';

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Encryption failed")]
    Encrypt,

    /// Wrong server secret or tampered ciphertext.
    #[error("Decryption failed")]
    Decrypt,

    #[error("Stored secret is malformed: {0}")]
    Malformed(String),
}

/// Seals and opens API keys with a key derived from the server secret.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(server_secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(server_secret.as_bytes());
        hasher.update(KEY_CONTEXT);
        let digest = hasher.finalize();
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<String, SecretError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Encrypt)?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn open(&self, sealed: &str) -> Result<String, SecretError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed.trim())
            .map_err(|e| SecretError::Malformed(e.to_string()))?;
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(SecretError::Malformed("too short".into()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SecretError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|e| SecretError::Malformed(e.to_string()))
    }
}

/// Display form of an API key: first four and last four characters with
/// bullets in between, or eight bullets for short keys.
pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 8 {
        return MASK_CHAR.to_string().repeat(8);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!(
        "{head}{}{tail}",
        MASK_CHAR.to_string().repeat(chars.len() - 8)
    )
}
