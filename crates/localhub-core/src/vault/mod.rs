//! Encrypted file vault contract.
//!
//! A vault maps user-visible (logical) file names to encrypted blobs. The
//! concrete, disk-backed implementation lives in `localhub-storage`; this
//! module only defines the entry type, the error taxonomy, naming rules and
//! the upload size check applied at the boundary.

mod naming;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use naming::{
    derive_on_disk_name, ensure_canonical, logical_name_of, sanitize_file_name, ENCRYPTED_SUFFIX,
    MAX_NAME_LEN,
};

/// Default cap on a single upload: 100 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// One stored file as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultEntry {
    /// Logical (user-visible) name.
    pub name: String,
    /// File name of the ciphertext inside the vault directory.
    pub internal_name: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Ciphertext size in bytes, as stored on disk.
    pub stored_size: u64,
    /// Last write time of the ciphertext.
    pub uploaded_at: DateTime<Utc>,
}

/// Errors produced by vault implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// No ciphertext exists for the requested name.
    #[error("file not found: {name}")]
    NotFound { name: String },
    /// The supplied name cannot be used as a vault file name.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    /// Ciphertext failed authentication or is malformed. Deliberately carries
    /// no detail about the cause.
    #[error("file could not be decrypted")]
    Decryption,
    /// Upload exceeds the configured maximum.
    #[error("upload of {size} bytes exceeds the limit of {max} bytes")]
    SizeLimit { size: u64, max: u64 },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Reject uploads larger than `max` bytes. Exactly `max` is accepted.
pub fn ensure_upload_within_limit(size: u64, max: u64) -> Result<(), VaultError> {
    if size > max {
        return Err(VaultError::SizeLimit { size, max });
    }
    Ok(())
}

/// Contract shared by vault implementations. All operations are synchronous
/// and block on disk and cipher work; async callers should move them off the
/// runtime threads.
pub trait FileVault: Send + Sync {
    /// Entries ordered most recent first, ties broken by on-disk name.
    fn list(&self) -> Result<Vec<VaultEntry>, VaultError>;

    /// Encrypt and store `plaintext` under the sanitized form of `name`,
    /// silently replacing any existing entry.
    fn put(&self, name: &str, plaintext: &[u8]) -> Result<VaultEntry, VaultError>;

    /// Decrypt and return the contents stored under `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>, VaultError>;

    /// Remove the entry stored under `name`. Not idempotent: removing a
    /// missing entry is `NotFound`.
    fn delete(&self, name: &str) -> Result<(), VaultError>;
}

/// Sort entries newest first, then by on-disk name.
pub fn sort_entries(entries: &mut [VaultEntry]) {
    entries.sort_by(|a, b| {
        b.uploaded_at
            .cmp(&a.uploaded_at)
            .then_with(|| a.internal_name.cmp(&b.internal_name))
    });
}

/// In-memory vault for tests and smoke runs. Holds plaintext; not secure.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVault {
    inner: Arc<Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, DateTime<Utc>)>>, VaultError>
    {
        self.inner.lock().map_err(|err| VaultError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

fn memory_entry(name: &str, data: &[u8], uploaded_at: DateTime<Utc>) -> VaultEntry {
    VaultEntry {
        name: name.to_string(),
        internal_name: derive_on_disk_name(name),
        size: data.len() as u64,
        stored_size: data.len() as u64,
        uploaded_at,
    }
}

impl FileVault for InMemoryVault {
    fn list(&self) -> Result<Vec<VaultEntry>, VaultError> {
        let map = self.lock()?;
        let mut entries: Vec<VaultEntry> = map
            .iter()
            .map(|(name, (data, at))| memory_entry(name, data, *at))
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn put(&self, name: &str, plaintext: &[u8]) -> Result<VaultEntry, VaultError> {
        let name = sanitize_file_name(name)?;
        let now = Utc::now();
        let entry = memory_entry(&name, plaintext, now);
        self.lock()?.insert(name, (plaintext.to_vec(), now));
        Ok(entry)
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        ensure_canonical(name)?;
        self.lock()?
            .get(name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| VaultError::NotFound {
                name: name.to_string(),
            })
    }

    fn delete(&self, name: &str) -> Result<(), VaultError> {
        ensure_canonical(name)?;
        self.lock()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VaultError::NotFound {
                name: name.to_string(),
            })
    }
}
