//! Encryption at rest
//!
//! Secrets, job details and execution details are stored as
//! `base64(nonce (12 bytes) || ciphertext || tag)` using AES-256-GCM.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use std::path::Path;
use thiserror::Error;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid encrypted data: {0}")]
    InvalidEncryptedData(String),

    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}

/// Encrypt/decrypt capability used by the store
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM cipher with a single process-wide key
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// Loads the base64 key from `path`, generating and saving one when absent
    pub fn from_key_file(path: &Path) -> Result<Self, CipherError> {
        if path.exists() {
            let encoded = std::fs::read_to_string(path)?;
            let key = STANDARD
                .decode(encoded.trim())
                .map_err(|e| CipherError::InvalidEncryptedData(e.to_string()))?;
            return Self::new(&key);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        std::fs::write(path, STANDARD.encode(key))?;
        tracing::info!("Generated new encryption key at {}", path.display());

        Self::new(&key)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

        let mut encrypted = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        encrypted.extend_from_slice(&nonce_bytes);
        encrypted.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(encrypted))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let data = STANDARD
            .decode(ciphertext)
            .map_err(|e| CipherError::InvalidEncryptedData(e.to_string()))?;

        // nonce + tag at minimum
        if data.len() < NONCE_SIZE + 16 {
            return Err(CipherError::InvalidEncryptedData("too short".to_string()));
        }

        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|e| CipherError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::DecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = AesGcmCipher::new(&[7u8; 32]).unwrap();
        let encrypted = cipher.encrypt(r#"{"taskState":{}}"#).unwrap();

        assert_ne!(encrypted, r#"{"taskState":{}}"#);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), r#"{"taskState":{}}"#);
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let cipher = AesGcmCipher::new(&[7u8; 32]).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = AesGcmCipher::new(&[1u8; 32]).unwrap().encrypt("secret").unwrap();
        let other = AesGcmCipher::new(&[2u8; 32]).unwrap();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(CipherError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            AesGcmCipher::new(&[0u8; 16]),
            Err(CipherError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_key_file_is_created_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("ferry.key");

        let first = AesGcmCipher::from_key_file(&path).unwrap();
        assert!(path.exists());
        let encrypted = first.encrypt("payload").unwrap();

        let second = AesGcmCipher::from_key_file(&path).unwrap();
        assert_eq!(second.decrypt(&encrypted).unwrap(), "payload");
    }
}
