//! Backend HTTP contract
//!
//! Thin client over the plugin-runtime REST API. Every authenticated call
//! takes an explicit [`Credential`]; the client itself holds no token.

mod client;
mod types;

pub use client::{ApiClient, ApiReply, Credential};
pub use types::{Envelope, LogEntry, LoginRequest, SystemStatus};
