use std::path::{Path, PathBuf};
use std::fs;
use chrono::{DateTime, Utc};
use crate::core::config::Config;
use crate::core::error::Result;

/// File locations for the data document and its siblings
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,   // Data directory
    pub data_path: PathBuf,  // The JSON document
    pub lock_path: PathBuf,  // Cross-process lock marker
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf, data_file: &str, lock_file: &str) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;

        Ok(StorageLayout {
            data_path: base_dir.join(data_file),
            lock_path: base_dir.join(lock_file),
            base_dir,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.data_dir.clone(), &config.data_file, &config.lock_file)
    }

    /// Temporary sibling written before the atomic rename
    pub fn tmp_path(&self) -> PathBuf {
        sibling(&self.data_path, ".tmp")
    }

    /// Timestamped snapshot sibling, e.g. `books.json.bak-20240101-120000`
    pub fn backup_path(&self, at: DateTime<Utc>) -> PathBuf {
        sibling(&self.data_path, &format!(".bak-{}", at.format("%Y%m%d-%H%M%S")))
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn siblings_share_the_data_directory() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("nested"), "books.json", "books.json.lock").unwrap();

        assert!(layout.base_dir.is_dir());
        assert_eq!(layout.tmp_path(), dir.path().join("nested").join("books.json.tmp"));
        assert_eq!(layout.lock_path, dir.path().join("nested").join("books.json.lock"));

        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            layout.backup_path(at),
            dir.path().join("nested").join("books.json.bak-20240309-070501")
        );
    }
}
