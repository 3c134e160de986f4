//! Live session registry.
//!
//! Maps session ids to sessions, fans out close at shutdown, and resolves
//! `session://<id>/<file>` download locators to files inside the owning
//! session's staging directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::session::Session;
use crate::stager::paths::resolve_existing;
use crate::{AppError, Result};

/// Scheme of download locators handed to the client.
pub const LOCATOR_SCHEME: &str = "session://";

/// Close code reported to sessions ended by host shutdown.
pub const SHUTDOWN_CLOSE_CODE: i32 = 1;

/// Shared, cloneable registry of live sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

/// A parsed `session://<id>/<file>` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Owning session id.
    pub session_id: String,
    /// Path relative to the session's staging directory.
    pub file: String,
}

impl Locator {
    /// Build the locator for `file` in `session_id`.
    #[must_use]
    pub fn format(session_id: &str, file: &str) -> String {
        format!("{LOCATOR_SCHEME}{session_id}/{file}")
    }

    /// Parse a locator string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the string is not a
    /// `session://<id>/<file>` locator.
    pub fn parse(locator: &str) -> Result<Self> {
        let rest = locator
            .strip_prefix(LOCATOR_SCHEME)
            .ok_or_else(|| AppError::NotFound(format!("not a session locator: {locator}")))?;
        match rest.split_once('/') {
            Some((session_id, file)) if !session_id.is_empty() && !file.is_empty() => Ok(Self {
                session_id: session_id.to_owned(),
                file: file.to_owned(),
            }),
            _ => Err(AppError::NotFound(format!("incomplete session locator: {locator}"))),
        }
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session`, replacing any session with the same id.
    pub async fn insert(&self, session: Arc<Session>) {
        let id = session.id().to_owned();
        if self.sessions.lock().await.insert(id.clone(), session).is_some() {
            warn!(session_id = %id, "replaced a live session with the same id");
        }
    }

    /// Look up a live session.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Whether `session_id` is live.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Deregister a session, returning it if it was live.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.remove(session_id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Resolve a download locator on behalf of `requester` to an existing
    /// file inside that session's staging directory.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the locator is malformed, the session is
    ///   not live, or the file does not exist.
    /// - [`AppError::Unauthorized`] if the locator names another session.
    /// - [`AppError::PathViolation`] if the file resolves outside the
    ///   session's staging directory.
    pub async fn resolve_locator(&self, locator: &str, requester: &str) -> Result<PathBuf> {
        let parsed = Locator::parse(locator)?;
        if parsed.session_id != requester {
            return Err(AppError::Unauthorized(format!(
                "locator belongs to session {}",
                parsed.session_id
            )));
        }
        let session = self
            .get(&parsed.session_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("session {} is not live", parsed.session_id)))?;
        resolve_existing(session.staging_dir(), &parsed.file)
    }

    /// Close every live session concurrently and wait for all of them to
    /// finish tearing down.
    ///
    /// Returns the number of sessions closed.
    pub async fn shutdown(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().await.values().cloned().collect();
        if sessions.is_empty() {
            return 0;
        }

        info!(count = sessions.len(), "closing live sessions");

        let mut closing = JoinSet::new();
        for session in sessions {
            closing.spawn(async move { session.close(Some(SHUTDOWN_CLOSE_CODE)).await });
        }

        let mut closed = 0;
        while let Some(joined) = closing.join_next().await {
            match joined {
                Ok(_) => closed += 1,
                Err(err) => warn!(%err, "session close task failed"),
            }
        }

        info!(closed, "all sessions closed");
        closed
    }
}
