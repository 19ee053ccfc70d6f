//! Pending verification sessions
//!
//! The store holds at most one outstanding challenge per user. Each session
//! gets a timer task that removes it at its deadline; the timer checks the
//! session identity before removing anything, so a stale timer for a replaced
//! session is a no-op. Replacing or consuming a session also aborts its timer.
//!
//! The map lock is only held for in-memory mutation and never across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::allowlist::normalize_email;
use crate::code::VerificationCode;
use crate::error::{Result, VerifyError};
use crate::types::{ContextId, SessionId, UserId};
use crate::{DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS};

/// Session store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a code stays valid
    pub ttl: Duration,

    /// Wrong codes allowed per session before it is discarded.
    /// `None` allows unlimited guesses until expiry.
    pub max_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_attempts: None,
        }
    }
}

/// One outstanding verification attempt
#[derive(Debug, Clone)]
pub struct PendingSession {
    pub id: SessionId,
    pub user_id: UserId,
    /// Normalized address the code was sent to
    pub email: String,
    pub code: VerificationCode,
    pub context_id: ContextId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a successful consume hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedSession {
    pub email: String,
    pub context_id: ContextId,
}

struct SessionEntry {
    session: PendingSession,
    /// Monotonic deadline, the one the timer and the defensive check use
    deadline: Instant,
    failed_attempts: u32,
    expiry_task: Option<AbortHandle>,
}

impl SessionEntry {
    fn cancel_expiry(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<UserId, SessionEntry>>>;

/// Owner of all pending sessions
pub struct SessionStore {
    config: SessionConfig,
    sessions: SessionMap,
}

impl SessionStore {
    /// Create a new session store.
    ///
    /// A TTL above [`MAX_SESSION_TTL_SECS`] is clamped so deadlines always fit
    /// the clock types.
    pub fn new(mut config: SessionConfig) -> Self {
        let max_ttl = Duration::from_secs(MAX_SESSION_TTL_SECS);
        if config.ttl > max_ttl {
            warn!(
                "Session TTL of {}s exceeds the maximum; using {}s",
                config.ttl.as_secs(),
                MAX_SESSION_TTL_SECS
            );
            config.ttl = max_ttl;
        }

        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create (or replace) the pending session for a user.
    ///
    /// When called inside a Tokio runtime an expiry task is scheduled at the
    /// deadline. Outside a runtime only the check in [`consume`] enforces the
    /// deadline.
    ///
    /// [`consume`]: SessionStore::consume
    pub fn create_session(
        &self,
        user_id: UserId,
        email: &str,
        context_id: ContextId,
    ) -> PendingSession {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.config.ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(created_at);
        let now = Instant::now();
        let deadline = now.checked_add(self.config.ttl).unwrap_or(now);

        let session = PendingSession {
            id: SessionId::generate(),
            user_id,
            email: normalize_email(email),
            code: VerificationCode::generate(),
            context_id,
            created_at,
            expires_at,
        };

        let mut sessions = self.sessions.lock();

        let expiry_task = self.schedule_expiry(user_id, session.id, deadline);
        let entry = SessionEntry {
            session: session.clone(),
            deadline,
            failed_attempts: 0,
            expiry_task,
        };

        if let Some(mut previous) = sessions.insert(user_id, entry) {
            previous.cancel_expiry();
            debug!(
                "Session {} for user {} superseded by {}",
                previous.session.id.short(),
                user_id,
                session.id.short()
            );
        }

        info!(
            "Created verification session {} for user {} in context {}",
            session.id.short(),
            user_id,
            context_id
        );

        session
    }

    /// Validate a submitted code and, on match, destroy the session.
    ///
    /// An expired session fails with [`VerifyError::Expired`] whatever the
    /// code. A mismatch leaves the session in place unless the configured
    /// attempt limit is reached.
    pub fn consume(&self, user_id: UserId, submitted_code: &str) -> Result<ConsumedSession> {
        let mut sessions = self.sessions.lock();

        let entry = sessions
            .get_mut(&user_id)
            .ok_or(VerifyError::NoPendingSession)?;

        if Instant::now() > entry.deadline {
            if let Some(mut expired) = sessions.remove(&user_id) {
                expired.cancel_expiry();
            }
            debug!("Rejected code for user {}: session expired", user_id);
            return Err(VerifyError::Expired);
        }

        if !entry.session.code.matches(submitted_code) {
            entry.failed_attempts += 1;
            let exhausted = self
                .config
                .max_attempts
                .is_some_and(|max| entry.failed_attempts >= max);

            if exhausted {
                if let Some(mut discarded) = sessions.remove(&user_id) {
                    discarded.cancel_expiry();
                }
                info!("Discarded session for user {}: attempt limit reached", user_id);
                return Err(VerifyError::AttemptsExhausted);
            }
            return Err(VerifyError::CodeMismatch);
        }

        let mut entry = sessions
            .remove(&user_id)
            .ok_or(VerifyError::NoPendingSession)?;
        entry.cancel_expiry();

        info!(
            "Consumed verification session {} for user {}",
            entry.session.id.short(),
            user_id
        );

        Ok(ConsumedSession {
            email: entry.session.email,
            context_id: entry.session.context_id,
        })
    }

    /// Remove a session only if it is still the given one.
    ///
    /// Used to roll back after a failed delivery without touching a newer
    /// session created concurrently.
    pub fn discard(&self, user_id: UserId, session_id: SessionId) -> bool {
        match remove_if_current(&self.sessions, user_id, session_id) {
            Some(mut entry) => {
                entry.cancel_expiry();
                debug!("Discarded session {} for user {}", session_id.short(), user_id);
                true
            }
            None => false,
        }
    }

    /// Whether the user has a live session
    pub fn has_pending(&self, user_id: UserId) -> bool {
        self.sessions
            .lock()
            .get(&user_id)
            .is_some_and(|entry| Instant::now() <= entry.deadline)
    }

    /// Number of sessions currently held
    pub fn pending_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn schedule_expiry(
        &self,
        user_id: UserId,
        session_id: SessionId,
        deadline: Instant,
    ) -> Option<AbortHandle> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let sessions = Arc::clone(&self.sessions);

        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if remove_if_current(&sessions, user_id, session_id).is_some() {
                info!(
                    "Verification session {} for user {} expired",
                    session_id.short(),
                    user_id
                );
            }
        });

        Some(task.abort_handle())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        for entry in self.sessions.lock().values_mut() {
            entry.cancel_expiry();
        }
    }
}

fn remove_if_current(
    sessions: &Mutex<HashMap<UserId, SessionEntry>>,
    user_id: UserId,
    session_id: SessionId,
) -> Option<SessionEntry> {
    let mut sessions = sessions.lock();
    let is_current = sessions
        .get(&user_id)
        .is_some_and(|entry| entry.session.id == session_id);

    if is_current {
        sessions.remove(&user_id)
    } else {
        None
    }
}
