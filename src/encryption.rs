//! At-rest encryption for cached payloads and event archives.
//!
//! AES-256-GCM with a PBKDF2-SHA256 derived key. Each encryption draws
//! a fresh salt and nonce, so identical plaintexts never produce
//! identical ciphertexts. The output layout is
//! `base64(salt || nonce || ciphertext+tag)`.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::GovernanceSettings;
use crate::{AsahiError, Result};

const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;

/// AES-256-GCM encryption with PBKDF2-derived keys.
pub struct EncryptionManager {
    passphrase: Vec<u8>,
    iterations: u32,
    salt_length: usize,
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("passphrase", &"<redacted>")
            .field("iterations", &self.iterations)
            .field("salt_length", &self.salt_length)
            .finish()
    }
}

impl EncryptionManager {
    /// Create a manager with an explicit passphrase.
    pub fn new(passphrase: impl AsRef<[u8]>, settings: &GovernanceSettings) -> Result<Self> {
        let passphrase = passphrase.as_ref();
        if passphrase.is_empty() {
            return Err(AsahiError::Configuration(
                "encryption passphrase must not be empty".to_string(),
            ));
        }
        if settings.salt_length < 8 {
            return Err(AsahiError::Configuration(
                "salt length must be at least 8 bytes".to_string(),
            ));
        }
        Ok(Self {
            passphrase: passphrase.to_vec(),
            iterations: settings.pbkdf2_iterations,
            salt_length: settings.salt_length,
        })
    }

    /// Create a manager reading the passphrase from the configured
    /// environment variable.
    pub fn from_env(settings: &GovernanceSettings) -> Result<Self> {
        let passphrase = std::env::var(&settings.encryption_key_env).map_err(|_| {
            AsahiError::Configuration(format!(
                "encryption key not found in environment variable '{}'",
                settings.encryption_key_env
            ))
        })?;
        Self::new(passphrase, settings)
    }

    /// Encrypt a plaintext string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut salt = vec![0u8; self.salt_length];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AsahiError::Configuration(format!("cipher init failed: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AsahiError::Configuration("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(salt.len() + NONCE_LENGTH + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails on a wrong key or tampered data.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|e| AsahiError::Configuration(format!("invalid ciphertext encoding: {e}")))?;
        if blob.len() < self.salt_length + NONCE_LENGTH {
            return Err(AsahiError::Configuration(
                "ciphertext too short".to_string(),
            ));
        }
        let (salt, rest) = blob.split_at(self.salt_length);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AsahiError::Configuration(format!("cipher init failed: {e}")))?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
            AsahiError::Configuration("decryption failed: wrong key or tampered data".to_string())
        })?;
        String::from_utf8(plaintext)
            .map_err(|e| AsahiError::Configuration(format!("decrypted data is not UTF-8: {e}")))
    }

    /// One-way hash for audit correlation (not reversible).
    pub fn hash_for_audit(&self, value: &str) -> String {
        let digest = Sha256::digest(value.as_bytes());
        hex::encode(digest)
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.passphrase, salt, self.iterations, &mut key);
        key
    }
}
