//! Session gate
//!
//! Owns the bearer token and the authenticated/unauthenticated state
//! machine. Every sensitive call goes through [`SessionManager::authorized`],
//! which hands the operation a copy of the current credential and closes
//! the gate when the backend rejects it.
//!
//! ```text
//! Unauthenticated --login/validate ok--> Authenticated
//! Authenticated --logout | failed validate | 401/403--> Unauthenticated
//! ```

mod store;

pub use store::{StoredSession, TokenStore};

use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::api::{ApiClient, Credential};
use crate::config::ConsoleConfig;
use crate::constants::DEFAULT_PRINCIPAL;
use crate::error::{ConsoleError, Result};

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: Option<Credential>,
    pub authenticated: bool,
    pub principal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Authenticated { principal: String },
    Invalid,
}

impl ValidationOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

#[derive(Debug, Clone)]
enum SessionState {
    Unauthenticated,
    Authenticated {
        credential: Credential,
        principal: String,
    },
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    /// Bumped on every transition so a slow login/validate cannot
    /// resurrect a session that was closed while it was in flight
    epoch: u64,
}

pub struct SessionManager {
    api: ApiClient,
    store: TokenStore,
    validate_timeout: Duration,
    inner: RwLock<Inner>,
}

impl SessionManager {
    /// Create a manager in the Unauthenticated state
    pub fn new(api: ApiClient, store: TokenStore, validate_timeout: Duration) -> Self {
        Self {
            api,
            store,
            validate_timeout,
            inner: RwLock::new(Inner {
                state: SessionState::Unauthenticated,
                epoch: 0,
            }),
        }
    }

    pub fn from_config(api: ApiClient, config: &ConsoleConfig) -> Self {
        Self::new(
            api,
            TokenStore::new(config.token_path()),
            config.validate_timeout(),
        )
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn snapshot(&self) -> Session {
        match &self.inner.read().state {
            SessionState::Unauthenticated => Session {
                token: None,
                authenticated: false,
                principal: None,
            },
            SessionState::Authenticated {
                credential,
                principal,
            } => Session {
                token: Some(credential.clone()),
                authenticated: true,
                principal: Some(principal.clone()),
            },
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.inner.read().state, SessionState::Authenticated { .. })
    }

    pub fn principal(&self) -> Option<String> {
        self.snapshot().principal
    }

    /// Current credential, or `NotAuthenticated` when the gate is closed
    pub fn credential(&self) -> Result<Credential> {
        match &self.inner.read().state {
            SessionState::Authenticated { credential, .. } => Ok(credential.clone()),
            SessionState::Unauthenticated => Err(ConsoleError::NotAuthenticated),
        }
    }

    /// Log in with username/password. Never fails loudly: any rejection
    /// or network error returns false and leaves the session closed.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let epoch = self.close("new login attempt");

        let token = match self.api.login(username, password).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Login for {} failed: {}", username, e);
                return false;
            }
        };

        let credential = Credential::new(token);
        if !self.open(epoch, credential.clone(), username.to_string()) {
            warn!("Login for {} superseded by a concurrent transition", username);
            return false;
        }
        self.persist(&credential, username);
        info!("Logged in as {}", username);
        true
    }

    /// Probe the backend with `token`, racing the probe against `budget`.
    ///
    /// A rejection, a network error and an expired budget all resolve to
    /// `Invalid`, which purges the stored token. The losing probe is
    /// dropped, which cancels its request.
    pub async fn validate(&self, token: &str, budget: Duration) -> ValidationOutcome {
        let epoch = self.inner.read().epoch;
        let credential = Credential::new(token);

        let probe = self.api.get(&["api", "status"], &credential);
        let verdict = match tokio::time::timeout(budget, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no answer within {:?}", budget)),
        };

        if let Err(reason) = verdict {
            warn!("Session validation failed: {}", reason);
            self.purge("validation failed");
            return ValidationOutcome::Invalid;
        }

        let principal = self.stored_principal_for(token);
        if !self.open(epoch, credential.clone(), principal.clone()) {
            return ValidationOutcome::Invalid;
        }
        self.persist(&credential, &principal);
        info!("Session validated for {}", principal);
        ValidationOutcome::Authenticated { principal }
    }

    /// Process-start path: validate whatever token was persisted
    pub async fn restore(&self) -> ValidationOutcome {
        match self.store.load() {
            Ok(Some(stored)) => self.validate(&stored.token, self.validate_timeout).await,
            Ok(None) => ValidationOutcome::Invalid,
            Err(e) => {
                warn!("Discarding unreadable token file: {}", e);
                self.purge("unreadable token file");
                ValidationOutcome::Invalid
            }
        }
    }

    /// Drop the token and close the session. Idempotent.
    pub fn logout(&self) {
        self.purge("logout");
    }

    /// Tell the backend the session is over, then log out locally
    pub async fn sign_out(&self) {
        if let Ok(credential) = self.credential() {
            if let Err(e) = self.api.logout(&credential).await {
                warn!("Backend logout failed, closing locally: {}", e);
            }
        }
        self.logout();
    }

    /// Run `op` with a copy of the current credential.
    ///
    /// An authorization failure from `op` closes the session, unless the
    /// credential that failed has already been replaced.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.credential()?;
        let result = op(credential.clone()).await;
        if let Err(ConsoleError::AuthExpired(reason)) = &result {
            self.expire(&credential, reason);
        }
        result
    }

    fn expire(&self, failed: &Credential, reason: &str) {
        let current = matches!(
            &self.inner.read().state,
            SessionState::Authenticated { credential, .. } if credential == failed
        );
        if current {
            self.purge(reason);
        }
    }

    /// Transition to Unauthenticated and purge the persisted token
    fn purge(&self, reason: &str) {
        let was_open = {
            let mut inner = self.inner.write();
            inner.epoch += 1;
            let was_open = matches!(inner.state, SessionState::Authenticated { .. });
            inner.state = SessionState::Unauthenticated;
            was_open
        };
        if let Err(e) = self.store.clear() {
            warn!("Failed to remove persisted token: {}", e);
        }
        if was_open {
            info!("Session closed: {}", reason);
        }
    }

    /// Close the session; returns the epoch a follow-up `open` must match
    fn close(&self, reason: &str) -> u64 {
        self.purge(reason);
        self.inner.read().epoch
    }

    fn open(&self, epoch: u64, credential: Credential, principal: String) -> bool {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            return false;
        }
        inner.epoch += 1;
        inner.state = SessionState::Authenticated {
            credential,
            principal,
        };
        true
    }

    fn persist(&self, credential: &Credential, principal: &str) {
        let stored = StoredSession {
            token: credential.expose().to_string(),
            principal: Some(principal.to_string()),
        };
        if let Err(e) = self.store.save(&stored) {
            warn!("Failed to persist session token: {}", e);
        }
    }

    fn stored_principal_for(&self, token: &str) -> String {
        self.store
            .load()
            .ok()
            .flatten()
            .filter(|stored| stored.token == token)
            .and_then(|stored| stored.principal)
            .unwrap_or_else(|| DEFAULT_PRINCIPAL.to_string())
    }
}
