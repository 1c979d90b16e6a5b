use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::constants::plugins::{
    ARTIFACT_EXTENSION, DEFAULT_FUNCTION_NAME, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS,
};
use crate::error::{ConsoleError, Result};

/// Runtime state reported by the backend; read-only here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PluginStatus {
    #[default]
    Idle,
    Running,
    Error,
}

impl From<String> for PluginStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "error" | "failed" => Self::Error,
            _ => Self::Idle,
        }
    }
}

/// A plugin as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "cron_schedule", deserialize_with = "non_empty_string")]
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub module_path: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub status: PluginStatus,
    #[serde(default, alias = "lastRun", deserialize_with = "lenient_timestamp")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, alias = "nextRun", deserialize_with = "lenient_timestamp")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Plugin {
    /// Fill in a missing entry point the way the runtime would
    pub fn with_default_entry_point(mut self, namespace: &str) -> Self {
        if self.module_path.trim().is_empty() {
            self.module_path = default_module_path(namespace, &self.name);
        }
        if self.function_name.trim().is_empty() {
            self.function_name = DEFAULT_FUNCTION_NAME.to_string();
        }
        self
    }
}

pub fn default_module_path(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Everything needed to register a new plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub module_path: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default, rename = "timeout")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl PluginDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Request body with every default resolved
    pub fn to_wire(&self, namespace: &str) -> Value {
        json!({
            "name": self.name,
            "description": self
                .description
                .clone()
                .unwrap_or_else(|| format!("{} plugin", self.name)),
            "enabled": self.enabled.unwrap_or(true),
            "schedule": self.schedule.clone().unwrap_or_default(),
            "parameters": self.parameters,
            "module_path": non_empty(self.module_path.as_deref())
                .unwrap_or_else(|| default_module_path(namespace, &self.name)),
            "function_name": non_empty(self.function_name.as_deref())
                .unwrap_or_else(|| DEFAULT_FUNCTION_NAME.to_string()),
            "timeout": self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            "max_retries": self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }

    /// The same body as multipart text fields
    pub fn to_form_fields(&self, namespace: &str) -> Vec<(String, String)> {
        let Value::Object(wire) = self.to_wire(namespace) else {
            return Vec::new();
        };
        wire.into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect()
    }
}

/// Partial edit of an existing plugin; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub module_path: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default, rename = "timeout")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl PluginUpdate {
    /// Request body carrying only the fields set here, plus the entry
    /// point resolved against the existing record. The entry point is
    /// never sent empty.
    pub fn patch_body(&self, existing: &Plugin, namespace: &str) -> Value {
        let module_path = non_empty(self.module_path.as_deref())
            .or_else(|| non_empty(Some(existing.module_path.as_str())))
            .unwrap_or_else(|| default_module_path(namespace, &existing.name));
        let function_name = non_empty(self.function_name.as_deref())
            .or_else(|| non_empty(Some(existing.function_name.as_str())))
            .unwrap_or_else(|| DEFAULT_FUNCTION_NAME.to_string());

        let mut body = Map::new();
        if let Some(description) = &self.description {
            body.insert("description".into(), json!(description));
        }
        if let Some(enabled) = self.enabled {
            body.insert("enabled".into(), json!(enabled));
        }
        if let Some(schedule) = &self.schedule {
            body.insert("schedule".into(), json!(schedule));
        }
        if let Some(parameters) = &self.parameters {
            body.insert("parameters".into(), Value::Object(parameters.clone()));
        }
        if let Some(timeout) = self.timeout_secs {
            body.insert("timeout".into(), json!(timeout));
        }
        if let Some(retries) = self.max_retries {
            body.insert("max_retries".into(), json!(retries));
        }
        body.insert("module_path".into(), json!(module_path));
        body.insert("function_name".into(), json!(function_name));
        Value::Object(body)
    }
}

/// Executable source uploaded alongside a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SourceArtifact {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?
            .to_string();
        Ok(Self { file_name, bytes })
    }

    /// The runtime only loads one kind of source file
    pub fn check_kind(&self) -> Result<()> {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION) {
            return Err(ConsoleError::Validation(format!(
                "only .{} source files can be uploaded, got '{}'",
                ARTIFACT_EXTENSION, self.file_name
            )));
        }
        if self.bytes.is_empty() {
            return Err(ConsoleError::Validation(format!(
                "'{}' is empty",
                self.file_name
            )));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(non_empty(raw.as_deref()))
}

fn object_or_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
