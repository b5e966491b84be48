use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: String,
    pub data_dir: PathBuf,
    pub data_file: String,
    pub lock_file: String,

    // Advisory only: oversized writes still succeed but are logged
    pub max_file_size_mb: u64,

    pub enable_backups: bool,
    pub backup_every_n_writes: u64,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_env: "dev".to_string(),
            data_dir: PathBuf::from("./data"),
            data_file: "books.json".to_string(),
            lock_file: "books.json.lock".to_string(),
            max_file_size_mb: 10,
            enable_backups: true,
            backup_every_n_writes: 50,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to
    /// defaults for missing or unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let backup_every_n_writes =
            parse_or(&lookup, "BACKUP_EVERY_N_WRITES", defaults.backup_every_n_writes).max(1);

        Config {
            app_env: lookup("APP_ENV").unwrap_or(defaults.app_env),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            data_file: lookup("DATA_FILE").unwrap_or(defaults.data_file),
            lock_file: lookup("DATA_LOCK_FILE").unwrap_or(defaults.lock_file),
            max_file_size_mb: parse_or(&lookup, "MAX_FILE_SIZE_MB", defaults.max_file_size_mb),
            enable_backups: lookup("ENABLE_BACKUPS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.enable_backups),
            backup_every_n_writes,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable config value");
            default
        }),
        None => default,
    }
}
