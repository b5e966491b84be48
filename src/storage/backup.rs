use std::fs;
use std::path::PathBuf;
use chrono::Utc;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::storage::layout::StorageLayout;

/// When to take a snapshot of the data document
#[derive(Debug, Clone, Copy)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub every_n_writes: u64,
}

impl BackupPolicy {
    pub fn from_config(config: &Config) -> Self {
        BackupPolicy {
            enabled: config.enable_backups,
            every_n_writes: config.backup_every_n_writes.max(1),
        }
    }

    pub fn disabled() -> Self {
        BackupPolicy {
            enabled: false,
            every_n_writes: 1,
        }
    }

    /// `writes` is the running count including the write just committed.
    pub fn is_due(&self, writes: u64) -> bool {
        self.enabled && writes > 0 && writes % self.every_n_writes == 0
    }
}

impl Default for BackupPolicy {
    fn default() -> Self {
        BackupPolicy {
            enabled: true,
            every_n_writes: 50,
        }
    }
}

/// Write a timestamped copy of `data` next to the data file.
///
/// Not atomic: a snapshot is a convenience copy, the primary file is the
/// source of truth.
pub fn write_snapshot(layout: &StorageLayout, data: &[u8]) -> Result<PathBuf> {
    let path = layout.backup_path(Utc::now());
    fs::write(&path, data)?;
    Ok(path)
}
