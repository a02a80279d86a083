use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logs::DEFAULT_TAIL_LINES;

/// CLI surface definition. Running without a subcommand starts the server.
#[derive(Parser, Debug)]
#[command(
    name = "localhub",
    about = "Local personal hub: tasks, an encrypted file vault and backups",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API on the configured local address.
    Serve,
    /// Print version and exit.
    Version,
    /// Check that the key, vault and task file are usable.
    Health,
    /// Manage configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Work with the encrypted file vault.
    #[command(subcommand)]
    File(FileCommand),
    /// Work with the task list.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Archive the vault ciphertexts and the task list.
    Backup,
    /// Print the most recent log lines.
    Logs {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TAIL_LINES)]
        lines: usize,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a config file with the resolved defaults if none exists.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FileCommand {
    /// List stored files, newest first.
    List,
    /// Encrypt a local file into the vault.
    Put {
        path: PathBuf,
        /// Store under this name instead of the file's own name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Decrypt a stored file to disk.
    Get {
        name: String,
        /// Destination path; defaults to the stored name in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a stored file.
    Rm { name: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    List,
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Free-form due date, e.g. 2025-03-01.
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task completed.
    Done { id: u64 },
    /// Mark a task open again.
    Undo { id: u64 },
    Rm { id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["localhub"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn parses_global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["localhub", "health", "--config", "/tmp/c.toml"])
            .expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn parses_file_put_with_name() {
        let cli = Cli::try_parse_from(["localhub", "file", "put", "a.txt", "--name", "b.txt"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::File(FileCommand::Put {
                path: PathBuf::from("a.txt"),
                name: Some("b.txt".into()),
            }))
        );
    }

    #[test]
    fn parses_task_add_and_logs_default() {
        let cli = Cli::try_parse_from(["localhub", "task", "add", "Ship", "--due", "2025-03-01"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Task(TaskCommand::Add {
                title: "Ship".into(),
                description: None,
                due: Some("2025-03-01".into()),
            }))
        );

        let cli = Cli::try_parse_from(["localhub", "logs"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Logs {
                lines: DEFAULT_TAIL_LINES
            })
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["localhub", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
