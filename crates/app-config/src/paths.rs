//! File system paths for the client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// State file holding the non-secure key/value store.
const KV_STORE_NAME: &str = "state.json";

/// Manages file system paths for the client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client runtime files (~/.thrive)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.thrive`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".thrive"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.thrive).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.thrive/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the key/value store file path (~/.thrive/state.json).
    pub fn kv_store_file(&self) -> PathBuf {
        self.base_dir.join(KV_STORE_NAME)
    }

    /// Get the log directory (~/.thrive/logs).
    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}
