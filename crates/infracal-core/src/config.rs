//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extractor used when a caller does not name one.
pub const DEFAULT_EXTRACTOR: &str = "layered-1";

/// Paths to all InfraCalendar data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database file (`data/infracal.db`).
    pub database: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            database: root.join("infracal.db"),
            root,
        })
    }
}

/// Top-level InfraCalendar configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfracalConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Extractor version stamped on events when a request does not name one.
    pub default_extractor: String,
    /// How long a connection waits on another writer's lock, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl InfracalConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let port = parse_env("PORT", 3010u16)?;
        let busy_timeout_ms = parse_env("INFRACAL_BUSY_TIMEOUT_MS", 5000u64)?;
        let default_extractor = std::env::var("INFRACAL_EXTRACTOR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXTRACTOR.to_string());

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            default_extractor,
            busy_timeout_ms,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_paths_layout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested");
        let paths = DataPaths::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(paths.database, root.join("infracal.db"));
    }

    #[test]
    fn test_parse_env_default_and_invalid() {
        std::env::remove_var("INFRACAL_TEST_UNSET");
        assert_eq!(parse_env("INFRACAL_TEST_UNSET", 7u16).unwrap(), 7);

        std::env::set_var("INFRACAL_TEST_BAD_PORT", "not-a-port");
        let err = parse_env("INFRACAL_TEST_BAD_PORT", 7u16).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        std::env::remove_var("INFRACAL_TEST_BAD_PORT");
    }
}
