//! Command handlers
//!
//! Each invocation builds the session gate, restores the persisted token
//! and runs one operation against the backend.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::{Map, Value};

use cronboard_core::plugins::{
    parse_plugin_config, Plugin, PluginDefinition, PluginUpdate, SourceArtifact,
};
use cronboard_core::{
    ApiClient, ConsoleConfig, ConsoleError, PluginReconciler, SessionManager, SystemConsole,
};

use crate::Commands;

#[derive(Subcommand)]
pub enum PluginCommand {
    /// List every registered plugin
    List,
    /// Show one plugin in full
    Show { name: String },
    Enable { name: String },
    Disable { name: String },
    /// Trigger an immediate run
    Run { name: String },
    /// Register a plugin, optionally uploading its source file
    Add {
        name: String,
        #[command(flatten)]
        fields: PluginFields,
        /// Python source to upload with the definition
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Change selected fields of a plugin; the rest are kept
    Update {
        name: String,
        #[command(flatten)]
        fields: PluginFields,
    },
    Delete { name: String },
    /// Read or write the plugin's entry in the aggregate config
    Config {
        #[command(subcommand)]
        command: PluginConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum PluginConfigCommand {
    Get { name: String },
    /// Replace the plugin's config with a JSON object
    Set {
        name: String,
        /// JSON text; read from --file when omitted
        json: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SystemCommand {
    Get,
    /// Validate then store a system config JSON object
    Set { json: String },
    /// Check a system config JSON object without storing it
    Validate { json: String },
}

#[derive(clap::Args, Default)]
pub struct PluginFields {
    #[arg(long)]
    description: Option<String>,
    /// Cron expression, e.g. "0 */6 * * *"
    #[arg(long)]
    schedule: Option<String>,
    #[arg(long)]
    enabled: Option<bool>,
    /// JSON object of run parameters
    #[arg(long)]
    params: Option<String>,
    #[arg(long)]
    module_path: Option<String>,
    #[arg(long)]
    function_name: Option<String>,
    /// Per-run timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
}

impl PluginFields {
    fn parameters(&self) -> Result<Option<Map<String, Value>>> {
        self.params
            .as_deref()
            .map(|text| parse_plugin_config(text).context("--params must be a JSON object"))
            .transpose()
    }

    fn into_definition(self, name: String) -> Result<PluginDefinition> {
        let parameters = self.parameters()?.unwrap_or_default();
        Ok(PluginDefinition {
            name,
            description: self.description,
            enabled: self.enabled,
            schedule: self.schedule,
            parameters,
            module_path: self.module_path,
            function_name: self.function_name,
            timeout_secs: self.timeout,
            max_retries: self.max_retries,
        })
    }

    fn into_update(self) -> Result<PluginUpdate> {
        let parameters = self.parameters()?;
        Ok(PluginUpdate {
            description: self.description,
            enabled: self.enabled,
            schedule: self.schedule,
            parameters,
            module_path: self.module_path,
            function_name: self.function_name,
            timeout_secs: self.timeout,
            max_retries: self.max_retries,
        })
    }
}

/// Dispatch one parsed command
pub async fn run(command: Commands, config: ConsoleConfig) -> Result<()> {
    let api = ApiClient::new(&config)?;
    let session = Arc::new(SessionManager::from_config(api, &config));

    match command {
        Commands::Login { username, password } => login(&session, username, password).await,
        Commands::Logout => {
            session.restore().await;
            session.sign_out().await;
            println!("Logged out.");
            Ok(())
        }
        Commands::Whoami => {
            if session.restore().await.is_authenticated() {
                println!("{}", session.principal().unwrap_or_default());
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        Commands::Status => {
            require_session(&session).await?;
            let status = SystemConsole::new(session).status().await?;
            println!("Plugins:       {} ({} active)", status.total_plugins, status.active_plugins);
            println!("Running tasks: {}", status.running_tasks);
            println!("Uptime:        {}", status.system_uptime);
            if let Some(last) = status.last_update {
                println!("Last update:   {}", last);
            }
            Ok(())
        }
        Commands::Logs => {
            require_session(&session).await?;
            for entry in SystemConsole::new(session).logs().await? {
                println!("{} [{}] {}", entry.timestamp, entry.level, entry.message);
            }
            Ok(())
        }
        Commands::Plugins { command } => {
            require_session(&session).await?;
            plugins(PluginReconciler::new(session, &config), command).await
        }
        Commands::System { command } => {
            require_session(&session).await?;
            system(SystemConsole::new(session), command).await
        }
    }
}

async fn require_session(session: &SessionManager) -> Result<()> {
    if !session.restore().await.is_authenticated() {
        return Err(ConsoleError::NotAuthenticated.into());
    }
    Ok(())
}

async fn login(
    session: &SessionManager,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt("Username: ")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password: ")?,
    };

    if !session.login(&username, &password).await {
        bail!("login failed for {}", username);
    }
    println!("Logged in as {}.", username);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn plugins(reconciler: PluginReconciler, command: PluginCommand) -> Result<()> {
    match command {
        PluginCommand::List => {
            let plugins = reconciler.list_plugins().await?;
            if plugins.is_empty() {
                println!("No plugins registered.");
            }
            for plugin in &plugins {
                print_summary(plugin);
            }
        }
        PluginCommand::Show { name } => {
            let plugin = reconciler.plugin(&name).await?;
            println!("{}", serde_json::to_string_pretty(&plugin)?);
        }
        PluginCommand::Enable { name } => {
            reconciler.set_enabled(&name, true).await?;
            println!("Enabled {}.", name);
        }
        PluginCommand::Disable { name } => {
            reconciler.set_enabled(&name, false).await?;
            println!("Disabled {}.", name);
        }
        PluginCommand::Run { name } => {
            // refresh first so a disabled plugin is refused locally
            reconciler.list_plugins().await?;
            reconciler.run(&name).await?;
            println!("Run of {} accepted.", name);
        }
        PluginCommand::Add { name, fields, file } => {
            let definition = fields.into_definition(name)?;
            let artifact = match file {
                Some(path) => Some(SourceArtifact::from_path(&path).await?),
                None => None,
            };
            reconciler.add_plugin(&definition, artifact).await?;
            println!("Added {}.", definition.name);
        }
        PluginCommand::Update { name, fields } => {
            reconciler.update_plugin(&name, &fields.into_update()?).await?;
            println!("Updated {}.", name);
        }
        PluginCommand::Delete { name } => {
            reconciler.delete_plugin(&name).await?;
            println!("Deleted {}.", name);
        }
        PluginCommand::Config { command } => match command {
            PluginConfigCommand::Get { name } => {
                let config = reconciler.read_plugin_config(&name).await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            PluginConfigCommand::Set { name, json, file } => {
                let text = match (json, file) {
                    (Some(text), _) => text,
                    (None, Some(path)) => std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    (None, None) => bail!("provide the config as JSON text or with --file"),
                };
                reconciler.write_plugin_config(&name, &text).await?;
                println!("Config for {} saved.", name);
            }
        },
    }
    Ok(())
}

fn print_summary(plugin: &Plugin) {
    let state = if plugin.enabled { "enabled" } else { "disabled" };
    println!(
        "{:<24} {:<9} {:<8} {:<16} {}",
        plugin.name,
        state,
        format!("{:?}", plugin.status).to_lowercase(),
        plugin.schedule.as_deref().unwrap_or("-"),
        plugin
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
    );
}

async fn system(console: SystemConsole, command: SystemCommand) -> Result<()> {
    match command {
        SystemCommand::Get => {
            let config = console.read_system_config().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        SystemCommand::Set { json } => {
            console.write_system_config(&parse_object(&json)?).await?;
            println!("System config saved.");
        }
        SystemCommand::Validate { json } => {
            console.validate_system_config(&parse_object(&json)?).await?;
            println!("System config is valid.");
        }
    }
    Ok(())
}

fn parse_object(text: &str) -> Result<Map<String, Value>> {
    Ok(parse_plugin_config(text)?)
}
