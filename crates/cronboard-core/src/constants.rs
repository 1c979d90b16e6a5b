//! Shared constants

/// Directory under the user's home that holds config, tokens and logs
pub const CONFIG_DIR_NAME: &str = ".cronboard";

/// Principal reported when a restored token carries no stored username
pub const DEFAULT_PRINCIPAL: &str = "admin";

pub mod api {
    pub const DEFAULT_API_URL: &str = "http://localhost:5000";
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const VALIDATE_TIMEOUT_MS: u64 = 5_000;
    pub const USER_AGENT: &str = concat!("cronboard/", env!("CARGO_PKG_VERSION"));
}

pub mod plugins {
    pub const DEFAULT_NAMESPACE: &str = "subscribe.scripts";
    pub const DEFAULT_FUNCTION_NAME: &str = "main";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Source artifacts the runtime knows how to load
    pub const ARTIFACT_EXTENSION: &str = "py";
}
