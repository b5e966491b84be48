use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

/// Store introspection for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHealth {
    pub version: u32,
    pub data_file: PathBuf,
    /// Modification time of the data file when it was last loaded or written
    pub last_loaded: Option<DateTime<Utc>>,
    pub book_count: usize,
    pub writes_since_open: u64,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(flatten)]
    pub store: StoreHealth,
}
