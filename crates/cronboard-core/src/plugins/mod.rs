//! Plugin definitions and configuration
//!
//! [`PluginReconciler`] keeps a view of the backend's plugin collection and
//! performs every read-modify-write against it. The backend stays the
//! source of truth: each mutating call ends with a full re-fetch.

mod config;
mod pending;
mod reconciler;
mod types;

pub use config::{extract_plugin_config, merge_plugin_config, parse_plugin_config, ConfigObject};
pub use pending::{PendingGuard, PendingSet};
pub use reconciler::PluginReconciler;
pub use types::{
    default_module_path, parse_timestamp, Plugin, PluginDefinition, PluginStatus, PluginUpdate,
    SourceArtifact,
};
