//! Runtime status, recent logs and the system-wide config document

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::info;

use crate::api::{LogEntry, SystemStatus};
use crate::error::{ConsoleError, Endpoint, Result};
use crate::session::SessionManager;

const SYSTEM_CONFIG_PATH: [&str; 3] = ["api", "config", "system"];

pub struct SystemConsole {
    session: Arc<SessionManager>,
}

impl SystemConsole {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        let api = self.session.api();
        self.session
            .authorized(|cred| async move { api.get_data(&["api", "status"], &cred).await })
            .await
    }

    /// Most recent runtime log lines, oldest first
    pub async fn logs(&self) -> Result<Vec<LogEntry>> {
        let api = self.session.api();
        self.session
            .authorized(|cred| async move { api.get_data(&["api", "logs"], &cred).await })
            .await
    }

    pub async fn read_system_config(&self) -> Result<Map<String, Value>> {
        let api = self.session.api();
        let document = self
            .session
            .authorized(|cred| async move {
                api.get_data::<Value>(&SYSTEM_CONFIG_PATH, &cred).await
            })
            .await?;
        match document {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(ConsoleError::Server(format!(
                "system config is not an object: {}",
                other
            ))),
        }
    }

    /// Ask the backend whether `config` would be accepted, without storing it
    pub async fn validate_system_config(&self, config: &Map<String, Value>) -> Result<()> {
        let api = self.session.api();
        self.session
            .authorized(|cred| async move {
                let mut segments = SYSTEM_CONFIG_PATH.to_vec();
                segments.push("validate");
                let request = api.authed(Method::POST, &segments, &cred).json(config);
                api.send(request, Endpoint::Validation).await.map(|_| ())
            })
            .await
    }

    /// Validate, then store. Nothing is written when validation fails.
    pub async fn write_system_config(&self, config: &Map<String, Value>) -> Result<()> {
        self.validate_system_config(config).await?;

        let api = self.session.api();
        self.session
            .authorized(|cred| async move {
                let request = api.authed(Method::PUT, &SYSTEM_CONFIG_PATH, &cred).json(config);
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await?;
        info!("System config updated");
        Ok(())
    }
}
