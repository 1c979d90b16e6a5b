//! Durable bearer-token storage
//!
//! The token survives restarts until logout or rejection. It is stored as
//! JSON under a single fixed key next to the principal that obtained it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// The one fixed key the token is persisted under
    #[serde(rename = "authToken")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, if any
    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .context("failed to read token file")
            .map_err(|e| self.storage_error(e))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let stored: StoredSession = serde_json::from_str(&contents)
            .context("failed to parse token file")
            .map_err(|e| self.storage_error(e))?;
        Ok(Some(stored).filter(|s| !s.token.is_empty()))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        self.write(session).map_err(|e| self.storage_error(e))
    }

    fn write(&self, session: &StoredSession) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, contents)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = fs::metadata(&self.path) {
                let mut permissions = metadata.permissions();
                permissions.set_mode(0o600);
                let _ = fs::set_permissions(&self.path, permissions);
            }
        }
        Ok(())
    }

    /// Remove the persisted token; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(e.into())),
        }
    }

    fn storage_error(&self, err: anyhow::Error) -> ConsoleError {
        ConsoleError::Storage(err.context(self.path.display().to_string()))
    }
}
