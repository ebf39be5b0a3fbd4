//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://thrive.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via
/// SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "publishable-key",
};

/// Default web-system base URL (the secondary backend that mirrors profile data).
pub const DEFAULT_WEB_SYSTEM_URL: &str = match option_env!("WEB_SYSTEM_URL") {
    Some(url) => url,
    None => "https://api.thrive.club",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Web-system base URL for the best-effort profile mirror.
    #[serde(default = "default_web_system_url")]
    pub web_system_url: String,
    /// Redirect URL registered with the identity provider for email
    /// confirmation and OAuth completion deep links.
    #[serde(default = "default_auth_redirect_url")]
    pub auth_redirect_url: String,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_web_system_url() -> String {
    DEFAULT_WEB_SYSTEM_URL.to_string()
}

fn default_auth_redirect_url() -> String {
    "thrive://auth/callback".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string(),
            web_system_url: DEFAULT_WEB_SYSTEM_URL.to_string(),
            auth_redirect_url: default_auth_redirect_url(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults.
    ///
    /// Note: supabase_url and supabase_publishable_key are compile-time only
    /// and always use the built-in defaults, regardless of what's in the
    /// config file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        // Force compile-time values (never from config file)
        config.supabase_url = DEFAULT_SUPABASE_URL.to_string();
        config.supabase_publishable_key = DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string();
        config.web_system_url = DEFAULT_WEB_SYSTEM_URL.to_string();

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    ///
    /// Only log_level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("THRIVE_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CoreResult<()> {
        url::Url::parse(&self.supabase_url)
            .map_err(|e| CoreError::Config(format!("Invalid supabase_url: {}", e)))?;
        url::Url::parse(&self.web_system_url)
            .map_err(|e| CoreError::Config(format!("Invalid web_system_url: {}", e)))?;

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(CoreError::Config(format!("Invalid log level: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.auth_redirect_url, "thrive://auth/callback");
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "debug".to_string(),
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.log_level, "debug");
        // Provider endpoints always come from compile-time defaults.
        assert_eq!(loaded.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nope"));
        let config = Config::load(&paths).unwrap();
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }
}
