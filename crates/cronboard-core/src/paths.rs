//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

use crate::constants::CONFIG_DIR_NAME;

/// Get the cronboard config directory (~/.cronboard)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.cronboard/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the logs directory (~/.cronboard/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Get the tokens directory (~/.cronboard/tokens)
pub fn tokens_dir() -> PathBuf {
    config_dir().join("tokens")
}

/// Get the persisted session file (~/.cronboard/tokens/session.json)
pub fn session_token_path() -> PathBuf {
    tokens_dir().join("session.json")
}
