use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;
const MIN_INTERVAL_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between scheduled polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    300
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_INTERVAL_SECS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Cookie fragment that carries the organization id
    #[serde(default = "default_org_cookie_key")]
    pub org_cookie_key: String,
    /// Cookie name the bare credential is sent under when calling bootstrap
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
}

fn default_base_url() -> String {
    "https://claude.ai".to_string()
}
fn default_org_cookie_key() -> String {
    "lastActiveOrg".to_string()
}
fn default_session_cookie_name() -> String {
    "sessionKey".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            org_cookie_key: default_org_cookie_key(),
            session_cookie_name: default_session_cookie_name(),
        }
    }
}

impl ApiConfig {
    pub fn bootstrap_url(&self) -> String {
        format!("{}/api/bootstrap", self.base_url.trim_end_matches('/'))
    }

    pub fn usage_url(&self, org_id: &str) -> String {
        format!(
            "{}/api/organizations/{}/usage",
            self.base_url.trim_end_matches('/'),
            org_id
        )
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            settings: Settings::default(),
            poll: PollConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("ubar").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.version != CONFIG_VERSION {
            issues.push(format!(
                "Unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            ));
        }
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.poll.interval_secs < MIN_INTERVAL_SECS {
            issues.push(format!(
                "poll.interval_secs = {} is below the minimum of {}",
                self.poll.interval_secs, MIN_INTERVAL_SECS
            ));
        }
        if self.poll.timeout_secs == 0 {
            issues.push("poll.timeout_secs must be greater than 0".to_string());
        }
        if !self.api.base_url.starts_with("https://") {
            issues.push(format!(
                "api.base_url must use HTTPS, got: {}",
                self.api.base_url
            ));
        }
        if self.api.org_cookie_key.trim().is_empty() {
            issues.push("api.org_cookie_key must not be empty".to_string());
        }
        if self.api.session_cookie_name.trim().is_empty() {
            issues.push("api.session_cookie_name must not be empty".to_string());
        }
        issues
    }
}
