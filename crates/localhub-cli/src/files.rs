use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::WrapErr, Result};
use localhub_core::vault::{ensure_upload_within_limit, FileVault};

use crate::{cli::FileCommand, config::Settings, storage};

/// Execute a file subcommand against the encrypted vault.
pub fn handle(cmd: FileCommand, settings: &Settings) -> Result<()> {
    let vault = storage::open_vault(settings)?;
    run(cmd, &vault, settings.max_upload_bytes)
}

fn run(cmd: FileCommand, vault: &dyn FileVault, max_upload_bytes: u64) -> Result<()> {
    match cmd {
        FileCommand::List => {
            let entries = vault.list()?;
            if entries.is_empty() {
                println!("No files yet. Add one with `localhub file put <path>`.");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:>10}  {}",
                    entry.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.size,
                    entry.name
                );
            }
        }
        FileCommand::Put { path, name } => {
            let size = fs::metadata(&path)
                .wrap_err_with(|| format!("cannot read {}", path.display()))?
                .len();
            ensure_upload_within_limit(size, max_upload_bytes)?;
            let name = match name {
                Some(name) => name,
                None => source_name(&path)?,
            };
            let data = fs::read(&path).wrap_err_with(|| format!("cannot read {}", path.display()))?;
            let entry = vault.put(&name, &data)?;
            println!("Stored {} ({} bytes)", entry.name, entry.size);
        }
        FileCommand::Get { name, output } => {
            let data = vault.get(&name)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&name));
            write_new(&output, &data)?;
            println!("Wrote {} ({} bytes)", output.display(), data.len());
        }
        FileCommand::Rm { name } => {
            vault.delete(&name)?;
            println!("Deleted {name}");
        }
    }
    Ok(())
}

fn source_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| color_eyre::eyre::eyre!("{} has no file name", path.display()))
}

/// Refuse to overwrite an existing file with decrypted output.
fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .wrap_err_with(|| format!("cannot create {}", path.display()))?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use localhub_core::vault::{InMemoryVault, VaultError};

    use super::*;

    #[test]
    fn put_get_rm_through_the_vault() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = InMemoryVault::new();
        let source = dir.path().join("notes 1.txt");
        fs::write(&source, b"contents").expect("write source");

        run(
            FileCommand::Put {
                path: source,
                name: None,
            },
            &vault,
            1024,
        )
        .expect("put");
        assert_eq!(vault.list().expect("list")[0].name, "notes_1.txt");

        let output = dir.path().join("out.txt");
        run(
            FileCommand::Get {
                name: "notes_1.txt".into(),
                output: Some(output.clone()),
            },
            &vault,
            1024,
        )
        .expect("get");
        assert_eq!(fs::read(&output).expect("read output"), b"contents");

        run(
            FileCommand::Rm {
                name: "notes_1.txt".into(),
            },
            &vault,
            1024,
        )
        .expect("rm");
        assert!(vault.list().expect("list").is_empty());
    }

    #[test]
    fn put_over_the_limit_is_rejected_before_storing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = InMemoryVault::new();
        let source = dir.path().join("big.bin");
        fs::write(&source, [0u8; 9]).expect("write source");

        let err = run(
            FileCommand::Put {
                path: source,
                name: Some("big.bin".into()),
            },
            &vault,
            8,
        )
        .expect_err("should exceed limit");
        assert_eq!(
            err.downcast_ref::<VaultError>(),
            Some(&VaultError::SizeLimit { size: 9, max: 8 })
        );
        assert!(vault.list().expect("list").is_empty());
    }

    #[test]
    fn get_does_not_overwrite_existing_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = InMemoryVault::new();
        vault.put("a.txt", b"new").expect("put");
        let output = dir.path().join("a.txt");
        fs::write(&output, b"old").expect("write existing");

        let err = run(
            FileCommand::Get {
                name: "a.txt".into(),
                output: Some(output.clone()),
            },
            &vault,
            1024,
        )
        .expect_err("existing output must be kept");
        assert_eq!(
            err.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::AlreadyExists)
        );
        assert_eq!(fs::read(&output).expect("read"), b"old");
    }
}
