//! Error taxonomy surfaced to console callers
//!
//! Every failure is classified into exactly one kind. Backend messages are
//! carried verbatim so the operator sees what the runtime said.

use reqwest::StatusCode;

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// The backend rejected the bearer token; the session has been closed
    #[error("session expired: {0}")]
    AuthExpired(String),

    /// Malformed config or a schema rejection from the backend
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The request never got a response
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered `success: false` for any other reason
    #[error("{0}")]
    Server(String),

    /// The aggregate config changed between fetch and write
    #[error("stale write: {0}")]
    StaleWrite(String),

    /// The gate is closed; no request was issued
    #[error("not logged in")]
    NotAuthenticated,

    /// Refused locally against the last confirmed state
    #[error("{0}")]
    Precondition(String),

    #[error("token storage: {0:#}")]
    Storage(#[source] anyhow::Error),
}

/// Which endpoint family produced a failure; decides how a 400 is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    General,
    Validation,
}

impl ConsoleError {
    /// True when the operator must log in again before retrying
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::NotAuthenticated)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthExpired(_) => "auth_expired",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Unreachable(_) => "unreachable",
            Self::Server(_) => "server",
            Self::StaleWrite(_) => "stale_write",
            Self::NotAuthenticated => "not_authenticated",
            Self::Precondition(_) => "precondition",
            Self::Storage(_) => "storage",
        }
    }

    /// Classify a backend reply that did not report success
    pub fn from_status(status: StatusCode, message: String, endpoint: Endpoint) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthExpired(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::PRECONDITION_FAILED => Self::StaleWrite(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
                if endpoint == Endpoint::Validation =>
            {
                Self::Validation(message)
            }
            _ if endpoint == Endpoint::Validation && status.is_success() => {
                Self::Validation(message)
            }
            _ => Self::Server(message),
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, err.to_string(), Endpoint::General);
        }
        if err.is_decode() {
            return Self::Server(format!("unreadable response: {}", err));
        }
        // connect, timeout, body and request errors all mean no usable reply
        Self::Unreachable(err.to_string())
    }
}
