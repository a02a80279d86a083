use std::{
    collections::HashMap,
    fs::{self, Metadata},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use localhub_core::vault::{
    derive_on_disk_name, ensure_canonical, logical_name_of, sanitize_file_name, sort_entries,
    FileVault, VaultEntry, VaultError,
};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument};

use crate::{
    cipher::VaultCipher,
    key_provider::{KeyError, KeyProvider},
};

/// Directory of AES-GCM blobs, one per logical file name.
///
/// Each blob is written to a temp file in the vault directory and renamed
/// into place, so readers never see a partially written ciphertext.
/// Operations on the same name are serialized within the process.
#[derive(Debug)]
pub struct EncryptedFileVault {
    root: PathBuf,
    cipher: VaultCipher,
    locks: NameLocks,
}

/// Ciphertext file as it sits in the vault directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub name: String,
    pub internal_name: String,
    pub path: PathBuf,
}

impl EncryptedFileVault {
    pub fn new(root: impl Into<PathBuf>, cipher: VaultCipher) -> Self {
        Self {
            root: root.into(),
            cipher,
            locks: NameLocks::default(),
        }
    }

    /// Load (or create) the key through `provider` and open the vault at `root`.
    pub fn open<P: KeyProvider>(root: impl Into<PathBuf>, provider: &P) -> Result<Self, KeyError> {
        let key = provider.load_or_create()?;
        Ok(Self::new(root, VaultCipher::new(&key)))
    }

    /// Ciphertext files currently in the vault, for archival. Never decrypts.
    pub fn blobs(&self) -> Result<Vec<StoredBlob>, VaultError> {
        self.scan()
    }

    fn path_for(&self, internal_name: &str) -> PathBuf {
        self.root.join(internal_name)
    }

    fn scan(&self) -> Result<Vec<StoredBlob>, VaultError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut blobs = Vec::new();
        for dirent in dir {
            let dirent = dirent.map_err(storage_err)?;
            if !dirent.file_type().map_err(storage_err)?.is_file() {
                continue;
            }
            let file_name = dirent.file_name();
            let Some(internal_name) = file_name.to_str() else {
                continue;
            };
            let Some(name) = logical_name_of(internal_name) else {
                continue;
            };
            if ensure_canonical(name).is_err() {
                debug!(internal_name, "skipping file with non-canonical name");
                continue;
            }
            blobs.push(StoredBlob {
                name: name.to_string(),
                internal_name: internal_name.to_string(),
                path: dirent.path(),
            });
        }
        Ok(blobs)
    }
}

impl FileVault for EncryptedFileVault {
    #[instrument(skip_all)]
    fn list(&self) -> Result<Vec<VaultEntry>, VaultError> {
        let mut entries = Vec::new();
        for blob in self.scan()? {
            match fs::metadata(&blob.path) {
                Ok(meta) => entries.push(entry_from_metadata(blob.name, blob.internal_name, &meta)?),
                // Deleted between the directory scan and the stat.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(storage_err(err)),
            }
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    #[instrument(skip_all, fields(name = %name, size = plaintext.len()))]
    fn put(&self, name: &str, plaintext: &[u8]) -> Result<VaultEntry, VaultError> {
        let name = sanitize_file_name(name)?;
        let internal_name = derive_on_disk_name(&name);
        let ciphertext = self.cipher.encrypt(plaintext).map_err(storage_err)?;

        let entry = self.locks.with_lock(&internal_name, || {
            fs::create_dir_all(&self.root).map_err(storage_err)?;
            let path = self.path_for(&internal_name);
            write_blob(&self.root, &path, &ciphertext)?;
            let meta = fs::metadata(&path).map_err(storage_err)?;
            entry_from_metadata(name.clone(), internal_name.clone(), &meta)
        })?;

        info!(file = %entry.name, "stored encrypted file");
        Ok(entry)
    }

    #[instrument(skip_all, fields(name = %name))]
    fn get(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        ensure_canonical(name)?;
        let internal_name = derive_on_disk_name(name);
        let path = self.path_for(&internal_name);
        let blob = self
            .locks
            .with_lock(&internal_name, || read_blob(&path, name))?;

        self.cipher.decrypt(&blob).map_err(|err| {
            error!(file = name, "decryption failed: {err}");
            VaultError::Decryption
        })
    }

    #[instrument(skip_all, fields(name = %name))]
    fn delete(&self, name: &str) -> Result<(), VaultError> {
        ensure_canonical(name)?;
        let internal_name = derive_on_disk_name(name);
        let path = self.path_for(&internal_name);
        self.locks
            .with_lock(&internal_name, || match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Err(VaultError::NotFound {
                    name: name.to_string(),
                }),
                Err(err) => Err(storage_err(err)),
            })?;
        info!(file = name, "deleted encrypted file");
        Ok(())
    }
}

/// One mutex per on-disk name, created on demand and dropped once unused.
#[derive(Debug, Default)]
struct NameLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    fn with_lock<T>(&self, name: &str, op: impl FnOnce() -> T) -> T {
        let handle = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(name.to_string()).or_default())
        };

        let result = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };

        // Clones are only taken and released under the map lock, so a count of
        // two (map + ours) means nobody else is waiting on this name.
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&handle) == 2 {
            map.remove(name);
        }
        drop(handle);
        result
    }
}

fn write_blob(dir: &Path, path: &Path, ciphertext: &[u8]) -> Result<(), VaultError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(storage_err)?;
    tmp.write_all(ciphertext).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_blob(path: &Path, name: &str) -> Result<Vec<u8>, VaultError> {
    fs::read(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            VaultError::NotFound {
                name: name.to_string(),
            }
        } else {
            storage_err(err)
        }
    })
}

fn entry_from_metadata(
    name: String,
    internal_name: String,
    meta: &Metadata,
) -> Result<VaultEntry, VaultError> {
    let modified = meta.modified().map_err(storage_err)?;
    Ok(VaultEntry {
        name,
        internal_name,
        size: VaultCipher::plaintext_len(meta.len()),
        stored_size: meta.len(),
        uploaded_at: DateTime::<Utc>::from(modified),
    })
}

fn storage_err<E: ToString>(err: E) -> VaultError {
    VaultError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        time::{Duration, SystemTime},
    };

    use super::*;
    use crate::key_provider::{FileKeyProvider, InMemoryKeyProvider};

    fn test_vault(root: &Path) -> EncryptedFileVault {
        EncryptedFileVault::open(root, &InMemoryKeyProvider::default()).expect("open vault")
    }

    fn names(vault: &EncryptedFileVault) -> Vec<String> {
        vault
            .list()
            .expect("list")
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    fn set_mtime(path: &Path, secs_after_epoch: u64) {
        File::options()
            .write(true)
            .open(path)
            .expect("open blob")
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
            .expect("set mtime");
    }

    #[test]
    fn lifecycle_put_get_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        assert!(names(&vault).is_empty());

        let entry = vault.put("a.txt", b"hello").expect("put");
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.internal_name, "a.txt.encrypted");
        assert_eq!(names(&vault), ["a.txt"]);
        assert_eq!(vault.get("a.txt").expect("get"), b"hello");

        vault.delete("a.txt").expect("delete");
        assert!(names(&vault).is_empty());
        assert_eq!(
            vault.get("a.txt"),
            Err(VaultError::NotFound {
                name: "a.txt".into()
            })
        );
        assert!(matches!(
            vault.delete("a.txt"),
            Err(VaultError::NotFound { .. })
        ));
    }

    #[test]
    fn plaintext_never_reaches_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.put("note.txt", b"hello-localhub").expect("put");

        let stored = fs::read(dir.path().join("note.txt.encrypted")).expect("read ciphertext");
        assert!(!stored
            .windows(b"hello-localhub".len())
            .any(|w| w == b"hello-localhub"));
    }

    #[test]
    fn overwrite_keeps_a_single_entry_with_latest_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.put("a.txt", b"v1").expect("put v1");
        vault.put("a.txt", b"v2").expect("put v2");

        assert_eq!(vault.get("a.txt").expect("get"), b"v2");
        assert_eq!(names(&vault), ["a.txt"]);
    }

    #[test]
    fn sizes_report_plaintext_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        let put = vault.put("data.bin", &[1u8; 1000]).expect("put");
        assert_eq!(put.size, 1000);
        assert!(put.stored_size > put.size);

        let listed = vault.list().expect("list");
        assert_eq!(listed[0].size, 1000);
        assert_eq!(listed[0].stored_size, put.stored_size);
    }

    #[test]
    fn empty_files_are_supported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.put("empty", b"").expect("put");
        assert_eq!(vault.get("empty").expect("get"), b"");
        assert_eq!(vault.list().expect("list")[0].size, 0);
    }

    #[test]
    fn traversal_names_stay_inside_the_vault() {
        let parent = tempfile::tempdir().expect("tempdir");
        let root = parent.path().join("vault");
        let vault = test_vault(&root);

        let entry = vault.put("../../etc/passwd", b"x").expect("put");
        assert_eq!(entry.name, "etc_passwd");
        assert!(root.join("etc_passwd.encrypted").is_file());

        let outside: Vec<_> = fs::read_dir(parent.path())
            .expect("read parent")
            .map(|e| e.expect("dirent").file_name())
            .collect();
        assert_eq!(outside, ["vault"]);
    }

    #[test]
    fn lookups_reject_non_canonical_names_before_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        for bad in ["../a.txt", "dir/a.txt", "", ".hidden"] {
            assert!(
                matches!(vault.get(bad), Err(VaultError::InvalidName { .. })),
                "{bad:?}"
            );
            assert!(matches!(
                vault.delete(bad),
                Err(VaultError::InvalidName { .. })
            ));
        }
        assert!(matches!(
            vault.put("..", b"x"),
            Err(VaultError::InvalidName { .. })
        ));
        assert!(names(&vault).is_empty());
    }

    #[test]
    fn tampered_blob_fails_with_decryption_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.put("a.txt", b"hello").expect("put");

        let path = dir.path().join("a.txt.encrypted");
        let mut blob = fs::read(&path).expect("read");
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        fs::write(&path, blob).expect("write");

        assert_eq!(vault.get("a.txt"), Err(VaultError::Decryption));
    }

    #[test]
    fn key_file_survives_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("uploads");
        let key_path = dir.path().join("data").join("secret.key");

        let first = EncryptedFileVault::open(&root, &FileKeyProvider::new(&key_path))
            .expect("first start");
        first.put("a.txt", b"persisted").expect("put");
        drop(first);

        let second = EncryptedFileVault::open(&root, &FileKeyProvider::new(&key_path))
            .expect("second start");
        assert_eq!(second.get("a.txt").expect("get"), b"persisted");
    }

    #[test]
    fn list_orders_newest_first_with_name_tie_break() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        for name in ["old.txt", "b.txt", "a.txt"] {
            vault.put(name, b"x").expect("put");
        }
        set_mtime(&dir.path().join("old.txt.encrypted"), 1_000);
        set_mtime(&dir.path().join("a.txt.encrypted"), 2_000);
        set_mtime(&dir.path().join("b.txt.encrypted"), 2_000);

        assert_eq!(names(&vault), ["a.txt", "b.txt", "old.txt"]);
    }

    #[test]
    fn list_ignores_foreign_files_and_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.put("kept.txt", b"x").expect("put");
        fs::write(dir.path().join("readme.txt"), b"plain").expect("write");
        fs::write(dir.path().join(".tmpXYZ"), b"partial").expect("write");
        fs::write(dir.path().join(".encrypted"), b"nameless").expect("write");
        fs::create_dir(dir.path().join("sub.encrypted")).expect("mkdir");

        assert_eq!(names(&vault), ["kept.txt"]);
        let blobs = vault.blobs().expect("blobs");
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].internal_name, "kept.txt.encrypted");
    }

    #[test]
    fn missing_vault_directory_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(&dir.path().join("not-yet"));
        assert!(vault.list().expect("list").is_empty());
        assert!(matches!(
            vault.get("a.txt"),
            Err(VaultError::NotFound { .. })
        ));
    }

    #[test]
    fn concurrent_writers_to_one_name_leave_a_complete_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

        std::thread::scope(|scope| {
            for payload in &payloads {
                let vault = &vault;
                scope.spawn(move || {
                    vault.put("race.bin", payload).expect("put");
                    vault.get("race.bin").expect("get");
                });
            }
        });

        let data = vault.get("race.bin").expect("final get");
        assert!(payloads.contains(&data));
        assert_eq!(names(&vault), ["race.bin"]);
        assert!(vault.locks.inner.lock().expect("locks").is_empty());
    }
}
