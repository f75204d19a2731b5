//! Persisted session storage.
//!
//! Replaces the browser client's local-storage keys (`access`, `user`,
//! `lastRoom`) with one explicitly-lifecycled `session.json` behind a narrow
//! load/save/clear interface. Written with 0o600 permissions on Unix.

use std::io;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth_api::{Credentials, UserProfile};

/// Default session file name.
pub const SESSION_FILE_NAME: &str = "session.json";

/// Persisted session contents.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    /// Bearer token from the last successful sign-in.
    pub access: String,
    /// The signed-in user.
    pub user: UserProfile,
    /// Last joined room, for the rejoin shortcut.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_room: Option<String>,
}

/// Errors produced by session persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session file i/o: {0}")]
    Io(#[from] io::Error),

    #[error("session file encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// File-backed session store.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store over an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store over `session.json` in the given data directory.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SESSION_FILE_NAME))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted session.
    ///
    /// Returns `None` when the file is missing or unreadable; a corrupt file
    /// is logged and treated as absent rather than failing the caller.
    pub fn load(&self) -> Option<StoredSession> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(event = "session_file_unreadable", error = %err);
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!(event = "session_file_corrupt", error = %err);
                None
            }
        }
    }

    /// Writes the full persisted session.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Fails on filesystem or encoding errors.
    pub fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }

    /// Stores credentials from a sign-in, preserving any remembered room.
    ///
    /// # Errors
    ///
    /// Fails on filesystem or encoding errors.
    pub fn store_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let last_room = self.load().and_then(|session| session.last_room);
        self.save(&StoredSession {
            access: credentials.access.expose_secret().to_string(),
            user: credentials.user.clone(),
            last_room,
        })
    }

    /// Loads persisted credentials, if any.
    pub fn credentials(&self) -> Option<Credentials> {
        let session = self.load()?;
        Some(Credentials {
            access: SecretString::new(session.access),
            user: session.user,
        })
    }

    /// Remembers the last joined room.
    ///
    /// A no-op when no session is stored; the room alone is not a session.
    ///
    /// # Errors
    ///
    /// Fails on filesystem or encoding errors.
    pub fn set_last_room(&self, room_id: &str) -> Result<(), StoreError> {
        let Some(mut session) = self.load() else {
            tracing::debug!(event = "last_room_skipped", reason = "no_session");
            return Ok(());
        };
        session.last_room = Some(room_id.to_string());
        self.save(&session)
    }

    /// Last joined room, if remembered.
    pub fn last_room(&self) -> Option<String> {
        self.load().and_then(|session| session.last_room)
    }

    /// Clears the persisted session (logout).
    ///
    /// A no-op when the file is already absent.
    ///
    /// # Errors
    ///
    /// Fails on filesystem errors other than the file being missing.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}
