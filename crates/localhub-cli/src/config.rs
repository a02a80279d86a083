use std::{
    fs,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::{config_dir, data_dir};
use localhub_core::vault::DEFAULT_MAX_UPLOAD_BYTES;
use serde::{Deserialize, Serialize};

/// Local-only by default.
pub const DEFAULT_BIND: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5000));

/// User-level configuration loaded from `~/.config/localhub/config.toml` (platform-specific).
/// Relative paths are resolved against `data_dir`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Base directory for all persisted state.
    pub data_dir: Option<PathBuf>,
    /// Directory holding the encrypted files.
    pub vault_dir: Option<PathBuf>,
    /// Raw 32-byte vault key. Losing it makes every stored file unreadable.
    pub key_file: Option<PathBuf>,
    pub tasks_file: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    /// HTTP listen address.
    pub bind: Option<SocketAddr>,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: Option<u64>,
}

/// Fully resolved settings, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub vault_dir: PathBuf,
    pub key_file: PathBuf,
    pub tasks_file: PathBuf,
    pub backup_dir: PathBuf,
    pub log_file: PathBuf,
    pub bind: SocketAddr,
    pub max_upload_bytes: u64,
}

impl Config {
    /// Fill every unset field with its default.
    pub fn resolve(&self) -> Result<Settings> {
        let base = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        Ok(self.resolve_in(&base))
    }

    pub(crate) fn resolve_in(&self, base: &Path) -> Settings {
        let under = |value: &Option<PathBuf>, default: &str| {
            base.join(value.as_deref().unwrap_or_else(|| Path::new(default)))
        };
        Settings {
            data_dir: base.to_path_buf(),
            vault_dir: under(&self.vault_dir, "uploads"),
            key_file: under(&self.key_file, "data/secret.key"),
            tasks_file: under(&self.tasks_file, "data/tasks.json"),
            backup_dir: under(&self.backup_dir, "backups"),
            log_file: under(&self.log_file, "localhub.log"),
            bind: self.bind.unwrap_or(DEFAULT_BIND),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    /// Config with every field spelled out, as written by `config init`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            data_dir: Some(settings.data_dir.clone()),
            vault_dir: Some(settings.vault_dir.clone()),
            key_file: Some(settings.key_file.clone()),
            tasks_file: Some(settings.tasks_file.clone()),
            backup_dir: Some(settings.backup_dir.clone()),
            log_file: Some(settings.log_file.clone()),
            bind: Some(settings.bind),
            max_upload_bytes: Some(settings.max_upload_bytes),
        }
    }
}

/// Load config from `path` or the default location; if missing, return defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("localhub").join("config.toml"))
}

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("localhub"))
}

/// Write `config` to `path` (or the default location) unless a file is
/// already there, to avoid clobbering user edits. Returns the path used.
pub fn write_default_if_missing(path: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_path()?,
    };
    write_to_path_if_missing(config, &path)?;
    Ok(path)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(())
}
