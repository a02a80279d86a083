use crate::config::Settings;
use color_eyre::{eyre::WrapErr, Result};
use localhub_storage::{encrypted_vault::EncryptedFileVault, key_provider::FileKeyProvider};
use localhub_task::JsonFileTaskRepo;
use tracing::debug;

/// Open the vault with the key from the configured key file, creating the key
/// on first run. Failure here is fatal: no vault request may be served.
pub fn open_vault(settings: &Settings) -> Result<EncryptedFileVault> {
    debug!(root = ?settings.vault_dir, key = ?settings.key_file, "initializing encrypted vault");
    EncryptedFileVault::open(
        settings.vault_dir.clone(),
        &FileKeyProvider::new(&settings.key_file),
    )
    .wrap_err("encryption key unavailable")
}

pub fn task_repo(settings: &Settings) -> JsonFileTaskRepo {
    JsonFileTaskRepo::new(settings.tasks_file.clone())
}

/// Helper for tests to construct a vault rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_vault(root: impl Into<std::path::PathBuf>) -> EncryptedFileVault {
    use localhub_storage::key_provider::{EncryptionKey, InMemoryKeyProvider};

    EncryptedFileVault::open(root, &InMemoryKeyProvider::with_key(EncryptionKey::generate()))
        .expect("in-memory key is always available")
}
