use crate::errors::{ConfigError, ConfigResult};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CSV_DIR: &str = "csv_files";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Environment-driven settings shared by pull and push.
///
/// Read from the process environment after loading an optional `.env` file.
/// Command line flags take precedence over these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `PGPASSWORD`
    pub password: Option<String>,
    /// `CSV_FILES_DIR`
    pub csv_dir: PathBuf,
    /// `SYNC_BATCH_SIZE`, rows fetched per page
    pub batch_size: usize,
    /// `SYNC_CONNECT_TIMEOUT_SECS`
    pub connect_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password: None,
            csv_dir: PathBuf::from(DEFAULT_CSV_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn load() -> ConfigResult<Self> {
        if let Err(e) = dotenv::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let password = lookup("PGPASSWORD").filter(|p| !p.is_empty());
        let csv_dir = lookup("CSV_FILES_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.csv_dir);
        let batch_size = match lookup("SYNC_BATCH_SIZE") {
            Some(value) => parse_positive("SYNC_BATCH_SIZE", &value)? as usize,
            None => defaults.batch_size,
        };
        let connect_timeout = match lookup("SYNC_CONNECT_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_positive("SYNC_CONNECT_TIMEOUT_SECS", &value)?),
            None => defaults.connect_timeout,
        };

        Ok(Self {
            password,
            csv_dir,
            batch_size,
            connect_timeout,
        })
    }
}

fn parse_positive(key: &str, value: &str) -> ConfigResult<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Setting {
            key: key.to_string(),
            reason: format!("'{}' is not a positive integer", value),
        }),
    }
}
