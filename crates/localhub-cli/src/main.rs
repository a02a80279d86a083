mod backup;
mod cli;
mod config;
mod error;
mod files;
mod logs;
mod routes;
mod server;
mod storage;
mod tasks;

use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Mutex,
};

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use localhub_core::{tasks::TaskRepository, vault::FileVault};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point: no subcommand means serve the HTTP API.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    let settings = config::load(cli.config.as_deref())?.resolve()?;
    init_tracing(&settings.log_file);

    match cli.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => server::run(settings).await?,
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&settings).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(cli.config.as_deref(), &settings)?,
        cli::Command::File(cmd) => files::handle(cmd, &settings)?,
        cli::Command::Task(cmd) => tasks::handle(cmd, &settings).await?,
        cli::Command::Backup => run_backup(&settings)?,
        cli::Command::Logs { lines } => {
            for line in logs::tail_lines(&settings.log_file, lines)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

/// Log to stderr and append the same events, without colour, to `log_file`.
fn init_tracing(log_file: &Path) {
    // Respect user-provided filters, default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file = log_file
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(log_file));
    let (file_layer, file_err) = match file {
        Ok(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(err) = file_err {
        tracing::warn!(path = %log_file.display(), "log file unavailable, logging to stderr only: {err}");
    }
}

fn print_version() {
    println!("localhub {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the key, the vault directory and the task file.
async fn run_health_check(settings: &config::Settings) -> Result<()> {
    let vault = storage::open_vault(settings)?;
    run_vault_health(&vault)?;
    println!("Vault: ok ({})", settings.vault_dir.display());

    let tasks = storage::task_repo(settings).list().await?;
    println!("Tasks: ok ({} stored)", tasks.len());
    Ok(())
}

fn run_vault_health<V: FileVault>(vault: &V) -> Result<()> {
    let probe_name = "localhub-health-probe";
    let payload = b"ok";
    // Never overwrite a user file that happens to share the probe's name.
    if vault.list()?.iter().any(|entry| entry.name == probe_name) {
        color_eyre::eyre::bail!("vault already holds a file named {probe_name}; rename it and retry");
    }
    vault.put(probe_name, payload)?;
    let round_trip = vault.get(probe_name);
    vault.delete(probe_name)?;

    if round_trip? != payload {
        color_eyre::eyre::bail!("vault round-trip failed");
    }
    Ok(())
}

fn init_config(path: Option<&Path>, settings: &config::Settings) -> Result<()> {
    let path = config::write_default_if_missing(path, &config::Config::from_settings(settings))?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn run_backup(settings: &config::Settings) -> Result<()> {
    let vault = storage::open_vault(settings)?;
    let summary = backup::create_backup(&vault, &settings.tasks_file, &settings.backup_dir)?;
    println!(
        "Backup written to {} ({} bytes)",
        summary.path.display(),
        summary.size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use localhub_core::vault::InMemoryVault;

    use super::*;

    #[test]
    fn health_check_with_in_memory_vault_succeeds() {
        let vault = InMemoryVault::new();
        run_vault_health(&vault).expect("health check should succeed");
        assert!(vault.list().expect("list").is_empty());
    }

    #[test]
    fn health_check_keeps_an_existing_file_with_the_same_name() {
        let vault = InMemoryVault::new();
        vault
            .put("localhub-health-probe", b"user data")
            .expect("put");

        let err = run_vault_health(&vault).expect_err("must not overwrite user data");
        assert!(err.to_string().contains("already holds"), "{err}");
        assert_eq!(
            vault.get("localhub-health-probe").expect("still stored"),
            b"user data"
        );
    }

    #[test]
    fn health_check_with_encrypted_vault_leaves_no_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = storage::test_vault(dir.path().join("uploads"));
        run_vault_health(&vault).expect("health check should succeed");
        assert!(vault.list().expect("list").is_empty());
    }
}
