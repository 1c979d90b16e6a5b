use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::IF_MATCH;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::{extract_plugin_config, merge_plugin_config, parse_plugin_config, ConfigObject};
use super::pending::PendingSet;
use super::types::{Plugin, PluginDefinition, PluginUpdate, SourceArtifact};
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Endpoint, Result};
use crate::session::SessionManager;

const CONFIG_PATH: [&str; 3] = ["api", "config", "plugin"];

/// Owner of the local plugin view and the aggregate-config merge
pub struct PluginReconciler {
    session: Arc<SessionManager>,
    namespace: String,
    validate_before_write: bool,
    view: RwLock<Vec<Plugin>>,
    pending: PendingSet,
}

impl PluginReconciler {
    pub fn new(session: Arc<SessionManager>, config: &ConsoleConfig) -> Self {
        Self {
            session,
            namespace: config.plugin_namespace.clone(),
            validate_before_write: config.validate_before_write,
            view: RwLock::new(Vec::new()),
            pending: PendingSet::default(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Last successfully fetched collection
    pub fn plugins(&self) -> Vec<Plugin> {
        self.view.read().clone()
    }

    /// True while a call targeting `name` is in flight
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.is_pending(name)
    }

    /// Fetch the collection. On any failure the view is emptied, not left stale.
    pub async fn list_plugins(&self) -> Result<Vec<Plugin>> {
        let api = self.session.api();
        let fetched = self
            .session
            .authorized(|cred| async move {
                api.get_data::<Vec<Plugin>>(&["api", "plugins"], &cred).await
            })
            .await;

        match fetched {
            Ok(plugins) => {
                let plugins: Vec<Plugin> = plugins
                    .into_iter()
                    .map(|p| p.with_default_entry_point(&self.namespace))
                    .collect();
                debug!("Fetched {} plugins", plugins.len());
                *self.view.write() = plugins.clone();
                Ok(plugins)
            }
            Err(e) => {
                self.view.write().clear();
                Err(e)
            }
        }
    }

    /// Full record for one plugin, entry point included
    pub async fn plugin(&self, name: &str) -> Result<Plugin> {
        let api = self.session.api();
        let plugin = self
            .session
            .authorized(|cred| async move {
                api.get_data::<Plugin>(&["api", "plugins", name, "status"], &cred)
                    .await
            })
            .await?;
        Ok(plugin.with_default_entry_point(&self.namespace))
    }

    /// Enable or disable through the dedicated toggle endpoint. Idempotent.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let _pending = self.pending.begin(name);
        let action = if enabled { "enable" } else { "disable" };
        let api = self.session.api();

        let result = self
            .session
            .authorized(|cred| async move {
                let request = api.authed(Method::POST, &["api", "plugins", name, action], &cred);
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Plugin {} {}d", name, action);
        }
        self.settle(result).await
    }

    /// Trigger a run. Success means accepted for execution, nothing more.
    pub async fn run(&self, name: &str) -> Result<()> {
        let known_disabled = self
            .view
            .read()
            .iter()
            .any(|p| p.name == name && !p.enabled);
        if known_disabled {
            return Err(ConsoleError::Precondition(format!(
                "plugin '{}' is disabled",
                name
            )));
        }

        let _pending = self.pending.begin(name);
        let api = self.session.api();
        let result = self
            .session
            .authorized(|cred| async move {
                let request = api.authed(Method::POST, &["api", "plugins", name, "run"], &cred);
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Plugin {} accepted for execution", name);
        }
        self.settle(result).await
    }

    /// Register a plugin, uploading its source when an artifact is given
    pub async fn add_plugin(
        &self,
        definition: &PluginDefinition,
        artifact: Option<SourceArtifact>,
    ) -> Result<()> {
        let definition = &PluginDefinition {
            name: definition.name.trim().to_string(),
            ..definition.clone()
        };
        let name = definition.name.as_str();
        if name.is_empty() {
            return Err(ConsoleError::Validation(
                "plugin name cannot be empty".to_string(),
            ));
        }
        if let Some(artifact) = &artifact {
            artifact.check_kind()?;
        }

        let _pending = self.pending.begin(name);
        let current = self.list_plugins().await?;
        if current.iter().any(|p| p.name == name) {
            return Err(ConsoleError::Conflict(format!(
                "plugin '{}' already exists",
                name
            )));
        }

        let api = self.session.api();
        let namespace = self.namespace.as_str();
        let result = self
            .session
            .authorized(|cred| async move {
                let request = match artifact {
                    Some(artifact) => {
                        let part = Part::bytes(artifact.bytes).file_name(artifact.file_name);
                        let form = definition
                            .to_form_fields(namespace)
                            .into_iter()
                            .fold(Form::new().part("file", part), |form, (key, value)| {
                                form.text(key, value)
                            });
                        api.authed(Method::POST, &["api", "plugins", "upload"], &cred)
                            .multipart(form)
                    }
                    None => api
                        .authed(Method::POST, &["api", "plugins", "add"], &cred)
                        .json(&definition.to_wire(namespace)),
                };
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Plugin {} added", name);
        }
        self.settle(result).await
    }

    /// Apply a partial edit. Only the fields that are set are sent, so
    /// fields left `None` keep whatever the backend holds at write time.
    /// The entry point is always resent from the current record.
    pub async fn update_plugin(&self, name: &str, update: &PluginUpdate) -> Result<()> {
        let _pending = self.pending.begin(name);
        let existing = self.plugin(name).await?;
        let body = update.patch_body(&existing, &self.namespace);

        let api = self.session.api();
        let result = self
            .session
            .authorized(|cred| async move {
                let request = api
                    .authed(Method::PUT, &["api", "plugins", name], &cred)
                    .json(&body);
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Plugin {} updated", name);
        }
        self.settle(result).await
    }

    /// Delete a plugin. The view is re-fetched whatever the outcome.
    pub async fn delete_plugin(&self, name: &str) -> Result<()> {
        let _pending = self.pending.begin(name);
        let api = self.session.api();
        let result = self
            .session
            .authorized(|cred| async move {
                let request = api.authed(Method::DELETE, &["api", "plugins", name, "delete"], &cred);
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Plugin {} deleted", name);
        }
        self.settle(result).await
    }

    /// This plugin's entry in the aggregate config; empty when absent
    pub async fn read_plugin_config(&self, name: &str) -> Result<ConfigObject> {
        let api = self.session.api();
        let aggregate = self
            .session
            .authorized(|cred| async move { api.get_data::<Value>(&CONFIG_PATH, &cred).await })
            .await?;
        Ok(extract_plugin_config(&aggregate, name))
    }

    /// Parse `text` and store it as this plugin's config
    pub async fn write_plugin_config(&self, name: &str, text: &str) -> Result<()> {
        let config = parse_plugin_config(text)?;
        self.write_plugin_config_value(name, config).await
    }

    /// Validate, fetch the aggregate fresh, merge the one entry, write back.
    ///
    /// A failure at any step leaves the persisted document untouched. When
    /// the backend tags the document with an ETag the write is conditional
    /// on it and a concurrent change surfaces as `StaleWrite`.
    pub async fn write_plugin_config_value(&self, name: &str, config: ConfigObject) -> Result<()> {
        let _pending = self.pending.begin(name);
        let api = self.session.api();
        let validate_first = self.validate_before_write;

        let result = self
            .session
            .authorized(|cred| async move {
                if validate_first {
                    let request = api
                        .authed(Method::POST, &["api", "plugins", name, "validate"], &cred)
                        .json(&config);
                    api.send(request, Endpoint::Validation).await?;
                }

                let fetched = api.get(&CONFIG_PATH, &cred).await?;
                let etag = fetched.etag.clone();
                let merged = merge_plugin_config(fetched.data::<Value>()?, name, config)?;

                let mut request = api.authed(Method::PUT, &CONFIG_PATH, &cred).json(&merged);
                if let Some(etag) = etag {
                    request = request.header(IF_MATCH, etag);
                }
                api.send(request, Endpoint::General).await.map(|_| ())
            })
            .await;
        if result.is_ok() {
            info!("Config for plugin {} written", name);
        }
        self.settle(result).await
    }

    /// Re-fetch after a mutation, then hand back the mutation's own result
    async fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = self.list_plugins().await {
            warn!("Refresh after plugin change failed: {}", e);
        }
        result
    }
}
