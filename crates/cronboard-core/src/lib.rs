//! Cronboard Core - operator console for a scheduled plugin runner
//!
//! This crate contains:
//! - Session gate with bearer-token persistence and startup validation
//! - HTTP client mapping backend replies onto one error taxonomy
//! - Plugin reconciler that merges per-plugin config into the aggregate document
//! - System status, logs and system config access

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod plugins;
pub mod session;
pub mod system;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, Credential};
pub use config::ConsoleConfig;
pub use error::{ConsoleError, Result};
pub use plugins::PluginReconciler;
pub use session::{Session, SessionManager, ValidationOutcome};
pub use system::SystemConsole;
