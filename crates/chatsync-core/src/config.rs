//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/chatsync/config.toml)
//! 3. Environment variables (CHATSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::presenter::Role;

/// Environment variable prefix
const ENV_PREFIX: &str = "CHATSYNC";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chat service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Milliseconds between feed fetches
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bearer token (optional; the feed may be readable anonymously)
    #[serde(default)]
    pub token: Option<String>,

    /// Role of the current user, gates the delete command
    #[serde(default)]
    pub role: Role,

    /// Display name of the current user, used to mark own messages
    #[serde(default)]
    pub username: Option<String>,

    /// Log file (logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            token: None,
            role: Role::default(),
            username: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (CHATSYNC_SERVER_URL, CHATSYNC_TOKEN, ...)
    /// 2. Config file (~/.config/chatsync/config.toml or CHATSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // CHATSYNC_SERVER_URL
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server_url = val;
            }
        }

        // CHATSYNC_POLL_INTERVAL_MS
        if let Ok(val) = std::env::var(format!("{}_POLL_INTERVAL_MS", ENV_PREFIX)) {
            self.poll_interval_ms = val
                .parse()
                .with_context(|| format!("Invalid {}_POLL_INTERVAL_MS: {}", ENV_PREFIX, val))?;
        }

        // CHATSYNC_REQUEST_TIMEOUT_SECS
        if let Ok(val) = std::env::var(format!("{}_REQUEST_TIMEOUT_SECS", ENV_PREFIX)) {
            self.request_timeout_secs = val.parse().with_context(|| {
                format!("Invalid {}_REQUEST_TIMEOUT_SECS: {}", ENV_PREFIX, val)
            })?;
        }

        // CHATSYNC_TOKEN
        if let Ok(val) = std::env::var(format!("{}_TOKEN", ENV_PREFIX)) {
            self.token = if val.is_empty() { None } else { Some(val) };
        }

        // CHATSYNC_ROLE
        if let Ok(val) = std::env::var(format!("{}_ROLE", ENV_PREFIX)) {
            self.role = val.parse().map_err(anyhow::Error::msg)?;
        }

        // CHATSYNC_USERNAME
        if let Ok(val) = std::env::var(format!("{}_USERNAME", ENV_PREFIX)) {
            self.username = if val.is_empty() { None } else { Some(val) };
        }

        Ok(())
    }

    /// Reject values the sync loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            bail!(
                "server_url must start with http:// or https:// (got '{}')",
                self.server_url
            );
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with CHATSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatsync")
            .join("config.toml")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "CHATSYNC_SERVER_URL",
        "CHATSYNC_POLL_INTERVAL_MS",
        "CHATSYNC_REQUEST_TIMEOUT_SECS",
        "CHATSYNC_TOKEN",
        "CHATSYNC_ROLE",
        "CHATSYNC_USERNAME",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:5000");
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.token.is_none());
        assert_eq!(config.role, Role::User);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_server_and_token() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("CHATSYNC_SERVER_URL", "https://chat.example.com");
        env::set_var("CHATSYNC_TOKEN", "abc123");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.token, Some("abc123".to_string()));

        // Empty string clears the token
        env::set_var("CHATSYNC_TOKEN", "");
        config.apply_env_overrides().unwrap();
        assert!(config.token.is_none());
    }

    #[test]
    fn test_env_override_role() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CHATSYNC_ROLE", "ADMIN");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.role, Role::Admin);

        env::set_var("CHATSYNC_ROLE", "superuser");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_env_override_poll_interval() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CHATSYNC_POLL_INTERVAL_MS", "500");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));

        env::set_var("CHATSYNC_POLL_INTERVAL_MS", "soon");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = Config {
            server_url: "ws://localhost:5000".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "https://chat.example.com"
            poll_interval_ms = 1500
            role = "admin"
            username = "alice"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.poll_interval_ms, 1500);
        assert_eq!(config.role, Role::Admin);
        assert_eq!(config.username, Some("alice".to_string()));
        // Unset fields take defaults
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/chatsync/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server_url, "http://localhost:5000");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            server_url: "https://chat.example.com".to_string(),
            token: Some("secret".to_string()),
            role: Role::Admin,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.server_url, config.server_url);
        assert_eq!(loaded.token, config.token);
        assert_eq!(loaded.role, Role::Admin);
    }
}
