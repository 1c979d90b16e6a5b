use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Only present on login replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Envelope {
    /// Best human-readable reason for a failed call, verbatim from the backend
    pub fn failure_message(&self, fallback: &str) -> String {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    /// Login token, either top-level or nested under `data`
    pub fn login_token(&self) -> Option<String> {
        self.token.clone().or_else(|| {
            self.data
                .as_ref()
                .and_then(|d| d.get("token"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Aggregate runtime status from `GET /api/status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub total_plugins: u64,
    #[serde(default)]
    pub active_plugins: u64,
    #[serde(default)]
    pub running_tasks: u64,
    #[serde(default)]
    pub system_uptime: String,
    #[serde(default)]
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}
