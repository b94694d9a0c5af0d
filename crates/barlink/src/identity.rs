// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session identity and its on-disk store.
//!
//! The identity is what a device needs to rejoin the same session after a
//! restart: the join code, the derived room key, whether it hosts, and the
//! worker's name and role. Order history is never stored.

use crate::code::{JoinCode, RoomKey};
use crate::protocol::{Hello, Role};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_WORKER_NAME: &str = "Worker";

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything that identifies this device within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_code: JoinCode,
    pub room_id: RoomKey,
    pub is_host: bool,
    pub worker_name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl SessionIdentity {
    /// Open a new session under a fresh code.
    pub fn host(worker_name: &str) -> Self {
        Self::new(JoinCode::generate(), true, worker_name)
    }

    /// Join an existing session.
    pub fn join(code: JoinCode, worker_name: &str) -> Self {
        Self::new(code, false, worker_name)
    }

    fn new(code: JoinCode, is_host: bool, worker_name: &str) -> Self {
        let trimmed = worker_name.trim();
        let worker_name = if trimmed.is_empty() {
            DEFAULT_WORKER_NAME.to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            room_id: code.room_key(),
            session_code: code,
            is_host,
            worker_name,
            role: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Hello announcing this identity.
    pub fn hello(&self) -> Hello {
        Hello {
            name: self.worker_name.clone(),
            role: self.role,
            session_code: self.session_code.to_string(),
        }
    }
}

/// JSON file holding the last session identity.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, identity: &SessionIdentity) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.path, content)?;
        debug!("Session saved to {:?}", self.path);
        Ok(())
    }

    /// Load the stored identity.
    ///
    /// A missing file is `Ok(None)`; so is a corrupt one, after a warning.
    pub fn load(&self) -> Result<Option<SessionIdentity>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!("Failed to load session from {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    /// Forget the stored identity. Missing files are fine.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
