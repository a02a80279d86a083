use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use color_eyre::Result;
use flate2::{write::GzEncoder, Compression};
use localhub_storage::encrypted_vault::EncryptedFileVault;
use serde::Serialize;
use tar::Builder;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Archive directory holding the vault ciphertexts.
pub const ARCHIVE_UPLOADS_DIR: &str = "uploads";
/// Archive path of the task list.
pub const ARCHIVE_TASKS_PATH: &str = "data/tasks.json";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupSummary {
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
}

/// Bundle every vault blob (still encrypted) and the task file into a
/// timestamped `.tar.gz` in `backup_dir`.
pub fn create_backup(
    vault: &EncryptedFileVault,
    tasks_file: &Path,
    backup_dir: &Path,
) -> Result<BackupSummary> {
    create_backup_at(vault, tasks_file, backup_dir, Local::now().naive_local())
}

#[instrument(skip_all, fields(dir = %backup_dir.display()))]
fn create_backup_at(
    vault: &EncryptedFileVault,
    tasks_file: &Path,
    backup_dir: &Path,
    stamp: NaiveDateTime,
) -> Result<BackupSummary> {
    fs::create_dir_all(backup_dir)?;
    let filename = format!("backup_{}.tar.gz", stamp.format("%Y-%m-%d_%H-%M-%S"));
    let path = backup_dir.join(&filename);

    let tmp = NamedTempFile::new_in(backup_dir)?;
    let mut archive = Builder::new(GzEncoder::new(tmp, Compression::default()));

    for blob in vault.blobs()? {
        let name = Path::new(ARCHIVE_UPLOADS_DIR).join(&blob.internal_name);
        match archive.append_path_with_name(&blob.path, &name) {
            Ok(()) => {}
            // Deleted after the scan; nothing to archive.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file = %blob.name, "skipping file removed during backup");
            }
            Err(err) => return Err(err.into()),
        }
    }
    if tasks_file.is_file() {
        archive.append_path_with_name(tasks_file, ARCHIVE_TASKS_PATH)?;
    }

    let tmp = archive.into_inner()?.finish()?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path)?;

    let size = fs::metadata(&path)?.len();
    info!(%filename, size, "backup created");
    Ok(BackupSummary {
        filename,
        path,
        size,
    })
}
