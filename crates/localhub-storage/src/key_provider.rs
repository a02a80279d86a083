use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, instrument};

/// Length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Symmetric key used for encryption at rest. Never log the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Fresh key from the OS random number generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([redacted])")
    }
}

/// Failures to obtain the key. Both are fatal: stored files are unreadable
/// without the key they were written with, so callers must not serve vault requests.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key file {} is unavailable: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },
    #[error("key file {} holds {len} bytes, expected {KEY_LEN}", path.display())]
    Malformed { path: PathBuf, len: usize },
}

/// Provides the vault key: load the existing one, or create it exactly once.
pub trait KeyProvider: Send + Sync {
    fn load_or_create(&self) -> Result<EncryptionKey, KeyError>;
}

/// Key stored as raw bytes in a single file.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn create(&self) -> Result<EncryptionKey, KeyError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;

        let key = EncryptionKey::generate();
        // Temp files are created with mode 0600 on Unix; the mode survives the persist.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| self.unavailable(e))?;
        tmp.write_all(key.as_bytes())
            .map_err(|e| self.unavailable(e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| self.unavailable(e))?;

        match tmp.persist_noclobber(&self.path) {
            Ok(_) => {
                sync_dir(parent).map_err(|e| self.unavailable(e))?;
                info!(path = %self.path.display(), "generated new encryption key");
                Ok(key)
            }
            // Another creator won the race; its key is the one on disk.
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => self.load(),
            Err(err) => Err(self.unavailable(err.error)),
        }
    }

    fn load(&self) -> Result<EncryptionKey, KeyError> {
        let bytes = fs::read(&self.path).map_err(|e| self.unavailable(e))?;
        decode_key(&self.path, &bytes)
    }

    fn unavailable(&self, err: io::Error) -> KeyError {
        KeyError::Unavailable {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

impl KeyProvider for FileKeyProvider {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn load_or_create(&self) -> Result<EncryptionKey, KeyError> {
        match fs::read(&self.path) {
            Ok(bytes) => decode_key(&self.path, &bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => self.create(),
            Err(err) => Err(self.unavailable(err)),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<EncryptionKey>>>,
}

impl InMemoryKeyProvider {
    /// Provider that always hands out `key`.
    pub fn with_key(key: EncryptionKey) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(key))),
        }
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn load_or_create(&self) -> Result<EncryptionKey, KeyError> {
        let mut guard = self.inner.lock().map_err(|err| KeyError::Unavailable {
            path: PathBuf::from("<memory>"),
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(guard.get_or_insert_with(EncryptionKey::generate).clone())
    }
}

/// Flush the directory entry of a freshly persisted file. Losing the key's
/// entry after ciphertexts reach disk would orphan every stored file.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn decode_key(path: &Path, bytes: &[u8]) -> Result<EncryptionKey, KeyError> {
    let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::Malformed {
        path: path.to_path_buf(),
        len: bytes.len(),
    })?;
    Ok(EncryptionKey::from_bytes(bytes))
}
