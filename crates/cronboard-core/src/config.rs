//! Console configuration
//!
//! Loaded from `~/.cronboard/config.toml` with environment overrides.
//! Every field is optional; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{api, plugins};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL of the plugin-runtime API
    pub api_url: String,
    /// Whole-request timeout for ordinary calls
    pub request_timeout_secs: u64,
    /// Budget for the session validation probe
    pub validate_timeout_ms: u64,
    /// Namespace used to synthesize a plugin's module path
    pub plugin_namespace: String,
    /// Ask the backend to schema-check plugin config before writing it
    pub validate_before_write: bool,
    /// Where the bearer token is persisted (defaults under ~/.cronboard/tokens)
    pub token_path: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: api::DEFAULT_API_URL.to_string(),
            request_timeout_secs: api::REQUEST_TIMEOUT_SECS,
            validate_timeout_ms: api::VALIDATE_TIMEOUT_MS,
            plugin_namespace: plugins::DEFAULT_NAMESPACE.to_string(),
            validate_before_write: true,
            token_path: None,
        }
    }
}

impl ConsoleConfig {
    /// Load from the default config file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&paths::config_file())?;
        config.apply_env();
        Ok(config)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `CRONBOARD_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(url) = value("CRONBOARD_API_URL") {
            self.api_url = url;
        }
        if let Some(ms) = value("CRONBOARD_VALIDATE_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.validate_timeout_ms = ms;
        }
        if let Some(path) = value("CRONBOARD_TOKEN_PATH") {
            self.token_path = Some(PathBuf::from(path));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_millis(self.validate_timeout_ms)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(paths::session_token_path)
    }
}
