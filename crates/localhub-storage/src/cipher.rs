//! Authenticated encryption of vault blobs.
//!
//! Blob layout: `version (1) || nonce (12) || ciphertext || tag (16)`.
//! The nonce is drawn fresh from the OS RNG for every call, so decryption
//! needs nothing but the key and the blob itself.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use thiserror::Error;

use crate::key_provider::EncryptionKey;

/// Leading byte of every blob written by this module.
pub const FORMAT_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Bytes a blob carries beyond its plaintext. GCM does not pad, so this is exact.
pub const CIPHER_OVERHEAD: usize = 1 + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed")]
    Encryption,
    /// Tampered, truncated, wrong-key or unknown-version input. The cause is
    /// intentionally not reported.
    #[error("ciphertext failed authentication or is malformed")]
    Decryption,
}

/// AES-256-GCM bound to one key for its whole lifetime.
pub struct VaultCipher {
    aead: Aes256Gcm,
}

impl VaultCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encryption)?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        blob.push(FORMAT_VERSION);
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    /// Returns plaintext only if the authentication tag verifies.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CipherError> {
        if blob.len() < CIPHER_OVERHEAD {
            return Err(CipherError::Decryption);
        }
        let (version, rest) = blob.split_first().ok_or(CipherError::Decryption)?;
        if *version != FORMAT_VERSION {
            return Err(CipherError::Decryption);
        }
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decryption)
    }

    /// Plaintext length of a well-formed blob of `blob_len` bytes.
    pub fn plaintext_len(blob_len: u64) -> u64 {
        blob_len.saturating_sub(CIPHER_OVERHEAD as u64)
    }
}

impl fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultCipher").finish_non_exhaustive()
    }
}
