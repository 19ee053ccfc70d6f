//! Verification policy
//!
//! Decides who may request a code, drives the session store and the delivery
//! boundary, and finalizes successful submissions by granting the verified
//! role.
//!
//! Per user the flow is `Unverified -> PendingCode -> Verified`, falling back
//! to `Unverified` when a session expires or runs out of attempts. External
//! lookups happen outside the session lock; only the in-memory mutation is
//! serialized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::allowlist::{normalize_email, AllowList};
use crate::boundary::{CodeNotifier, MembershipDirectory};
use crate::error::{Result, VerifyError};
use crate::session::SessionStore;
use crate::types::{ContextId, UserId};
use crate::verified::VerifiedRegistry;

/// Confirmation that a code is on its way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSent {
    /// Normalized address the code was sent to
    pub email: String,
    pub context_id: ContextId,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a successful code submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub email: String,
    pub context_id: ContextId,
    /// Community name for the confirmation message, when it could be fetched
    pub context_name: Option<String>,
}

/// Answer to a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Holds the verified role. The email is known only if this process
    /// performed the verification.
    Verified { email: Option<String> },
    NotVerified,
}

/// Orchestrates allow-list, sessions, delivery and role grants
pub struct VerificationPolicy {
    allowlist: Arc<AllowList>,
    sessions: SessionStore,
    verified: VerifiedRegistry,
    directory: Arc<dyn MembershipDirectory>,
    notifier: Arc<dyn CodeNotifier>,
}

impl VerificationPolicy {
    /// Create a new verification policy
    pub fn new(
        allowlist: Arc<AllowList>,
        sessions: SessionStore,
        directory: Arc<dyn MembershipDirectory>,
        notifier: Arc<dyn CodeNotifier>,
    ) -> Self {
        Self {
            allowlist,
            sessions,
            verified: VerifiedRegistry::new(),
            directory,
            notifier,
        }
    }

    /// Start verification for a user.
    ///
    /// Without an explicit context the first community the user shares with
    /// the bot is used.
    pub async fn request_verification(
        &self,
        user_id: UserId,
        email: &str,
        context: Option<ContextId>,
    ) -> Result<CodeSent> {
        let email = normalize_email(email);

        if !self.allowlist.contains(&email) {
            info!("User {} requested verification for non-invited email", user_id);
            return Err(VerifyError::NotInvited);
        }

        let context_id = self.resolve_context(user_id, context).await?;

        let already_verified = self
            .directory
            .has_verified_role(user_id, context_id)
            .await
            .map_err(|e| {
                warn!("Role lookup failed for user {} in {}: {}", user_id, context_id, e);
                VerifyError::DeliveryFailed
            })?;
        if already_verified {
            return Err(VerifyError::AlreadyVerified);
        }

        let session = self.sessions.create_session(user_id, &email, context_id);

        if let Err(e) = self.notifier.send_code(&session.email, &session.code).await {
            warn!("Email send failed for user {}: {}", user_id, e);
            self.sessions.discard(user_id, session.id);
            return Err(VerifyError::DeliveryFailed);
        }

        info!("Verification code sent for user {} in context {}", user_id, context_id);

        Ok(CodeSent {
            email: session.email,
            context_id,
            expires_at: session.expires_at,
        })
    }

    /// Check a submitted code and grant the verified role on success
    pub async fn submit_code(&self, user_id: UserId, code: &str) -> Result<Verified> {
        let consumed = self.sessions.consume(user_id, code)?;

        self.verified
            .record(user_id, consumed.email.clone(), consumed.context_id);

        if let Err(e) = self
            .directory
            .grant_verified_role(user_id, consumed.context_id)
            .await
        {
            warn!(
                "Failed to grant verified role to user {} in {}: {}",
                user_id, consumed.context_id, e
            );
            return Err(VerifyError::RoleGrantFailed);
        }

        info!("User {} verified in context {}", user_id, consumed.context_id);

        let context_name = match self.directory.context_name(consumed.context_id).await {
            Ok(name) => name,
            Err(e) => {
                debug!("No name for context {}: {}", consumed.context_id, e);
                None
            }
        };

        Ok(Verified {
            email: consumed.email,
            context_id: consumed.context_id,
            context_name,
        })
    }

    /// Current verification status.
    ///
    /// Role presence is authoritative, so a role removed by an administrator
    /// reads as not verified even if this process verified the user.
    pub async fn status(&self, user_id: UserId, context: Option<ContextId>) -> VerificationStatus {
        let contexts = match context {
            Some(context_id) => vec![context_id],
            None => match self.directory.list_shared_contexts(user_id).await {
                Ok(contexts) => contexts,
                Err(e) => {
                    warn!("Context lookup failed for user {}: {}", user_id, e);
                    return VerificationStatus::NotVerified;
                }
            },
        };

        for context_id in contexts {
            match self.directory.has_verified_role(user_id, context_id).await {
                Ok(true) => {
                    return VerificationStatus::Verified {
                        email: self.verified.email(user_id),
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Role lookup failed for user {} in {}: {}", user_id, context_id, e);
                }
            }
        }

        VerificationStatus::NotVerified
    }

    /// Add an email to the allow-list. Returns false if already present.
    pub fn add_allowed_email(&self, email: &str) -> bool {
        let added = self.allowlist.add(email);
        if added {
            info!("Added {} to allowed emails", normalize_email(email));
        }
        added
    }

    /// Allowed emails in insertion order
    pub fn list_allowed_emails(&self) -> Vec<String> {
        self.allowlist.list()
    }

    pub fn has_pending(&self, user_id: UserId) -> bool {
        self.sessions.has_pending(user_id)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn verified(&self) -> &VerifiedRegistry {
        &self.verified
    }

    async fn resolve_context(&self, user_id: UserId, context: Option<ContextId>) -> Result<ContextId> {
        match context {
            Some(context_id) => {
                let member = self
                    .directory
                    .is_member(user_id, context_id)
                    .await
                    .map_err(|e| {
                        warn!("Membership lookup failed for user {}: {}", user_id, e);
                        VerifyError::DeliveryFailed
                    })?;
                if member {
                    Ok(context_id)
                } else {
                    Err(VerifyError::NoSharedContext)
                }
            }
            None => {
                let contexts = self
                    .directory
                    .list_shared_contexts(user_id)
                    .await
                    .map_err(|e| {
                        warn!("Context lookup failed for user {}: {}", user_id, e);
                        VerifyError::DeliveryFailed
                    })?;
                debug!("User {} shares {} contexts with the bot", user_id, contexts.len());
                contexts.first().copied().ok_or(VerifyError::NoSharedContext)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{CodeNotifier, MembershipDirectory};
    use crate::code::VerificationCode;
    use crate::error::BoundaryError;
    use crate::session::SessionConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    const USER: UserId = UserId(100);
    const GUILD: ContextId = ContextId(1);

    #[derive(Default)]
    struct FakeDirectory {
        members: Mutex<HashSet<(UserId, ContextId)>>,
        roles: Mutex<HashSet<(UserId, ContextId)>>,
        fail_grant: bool,
    }

    impl FakeDirectory {
        fn with_member(user_id: UserId, context_id: ContextId) -> Self {
            let directory = Self::default();
            directory.members.lock().insert((user_id, context_id));
            directory
        }
    }

    #[async_trait]
    impl MembershipDirectory for FakeDirectory {
        async fn is_member(&self, user_id: UserId, context_id: ContextId) -> std::result::Result<bool, BoundaryError> {
            Ok(self.members.lock().contains(&(user_id, context_id)))
        }

        async fn has_verified_role(&self, user_id: UserId, context_id: ContextId) -> std::result::Result<bool, BoundaryError> {
            Ok(self.roles.lock().contains(&(user_id, context_id)))
        }

        async fn grant_verified_role(&self, user_id: UserId, context_id: ContextId) -> std::result::Result<(), BoundaryError> {
            if self.fail_grant {
                return Err(BoundaryError::new("missing permissions"));
            }
            self.roles.lock().insert((user_id, context_id));
            Ok(())
        }

        async fn list_shared_contexts(&self, user_id: UserId) -> std::result::Result<Vec<ContextId>, BoundaryError> {
            let mut contexts: Vec<ContextId> = self
                .members
                .lock()
                .iter()
                .filter(|(u, _)| *u == user_id)
                .map(|(_, c)| *c)
                .collect();
            contexts.sort();
            Ok(contexts)
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl FakeNotifier {
        fn last_code(&self) -> String {
            self.sent.lock().last().map(|(_, code)| code.clone()).unwrap()
        }
    }

    #[async_trait]
    impl CodeNotifier for FakeNotifier {
        async fn send_code(&self, email: &str, code: &VerificationCode) -> std::result::Result<(), BoundaryError> {
            if self.fail {
                return Err(BoundaryError::new("provider unreachable"));
            }
            self.sent.lock().push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn policy(directory: Arc<FakeDirectory>, notifier: Arc<FakeNotifier>) -> VerificationPolicy {
        let allowlist: AllowList = ["ok@b.com"].into_iter().collect();
        VerificationPolicy::new(
            Arc::new(allowlist),
            SessionStore::new(SessionConfig::default()),
            directory,
            notifier,
        )
    }

    #[tokio::test]
    async fn test_request_then_submit_verifies() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        let notifier = Arc::new(FakeNotifier::default());
        let policy = policy(directory.clone(), notifier.clone());

        let sent = policy.request_verification(USER, "OK@b.com", None).await.unwrap();
        assert_eq!(sent.email, "ok@b.com");
        assert_eq!(sent.context_id, GUILD);
        assert_eq!(notifier.sent.lock()[0].0, "ok@b.com");

        let verified = policy.submit_code(USER, &notifier.last_code()).await.unwrap();
        assert_eq!(verified.email, "ok@b.com");
        assert_eq!(verified.context_name, None);
        assert_eq!(policy.verified().email(USER).as_deref(), Some("ok@b.com"));
        assert!(directory.roles.lock().contains(&(USER, GUILD)));
        assert_eq!(
            policy.status(USER, None).await,
            VerificationStatus::Verified { email: Some("ok@b.com".into()) }
        );
    }

    #[tokio::test]
    async fn test_not_invited_never_dispatches() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        let notifier = Arc::new(FakeNotifier::default());
        let policy = policy(directory, notifier.clone());

        assert_eq!(
            policy.request_verification(USER, "a@b.com", None).await,
            Err(VerifyError::NotInvited)
        );
        assert!(!policy.has_pending(USER));
        assert!(notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_shared_context() {
        let policy = policy(Arc::new(FakeDirectory::default()), Arc::new(FakeNotifier::default()));
        assert_eq!(
            policy.request_verification(USER, "ok@b.com", None).await,
            Err(VerifyError::NoSharedContext)
        );
        assert_eq!(
            policy.request_verification(USER, "ok@b.com", Some(GUILD)).await,
            Err(VerifyError::NoSharedContext)
        );
    }

    #[tokio::test]
    async fn test_already_verified() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        directory.roles.lock().insert((USER, GUILD));
        let policy = policy(directory, Arc::new(FakeNotifier::default()));

        assert_eq!(
            policy.request_verification(USER, "ok@b.com", None).await,
            Err(VerifyError::AlreadyVerified)
        );
        assert!(!policy.has_pending(USER));
    }

    #[tokio::test]
    async fn test_delivery_failure_rolls_back() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        let notifier = Arc::new(FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        });
        let policy = policy(directory, notifier);

        assert_eq!(
            policy.request_verification(USER, "ok@b.com", None).await,
            Err(VerifyError::DeliveryFailed)
        );
        assert!(!policy.has_pending(USER));
    }

    #[tokio::test]
    async fn test_role_grant_failure_keeps_record() {
        let directory = Arc::new(FakeDirectory {
            fail_grant: true,
            ..FakeDirectory::with_member(USER, GUILD)
        });
        let notifier = Arc::new(FakeNotifier::default());
        let policy = policy(directory, notifier.clone());

        policy.request_verification(USER, "ok@b.com", None).await.unwrap();
        assert_eq!(
            policy.submit_code(USER, &notifier.last_code()).await,
            Err(VerifyError::RoleGrantFailed)
        );
        assert_eq!(policy.verified().email(USER).as_deref(), Some("ok@b.com"));
        assert!(!policy.has_pending(USER));
        assert_eq!(policy.status(USER, Some(GUILD)).await, VerificationStatus::NotVerified);
    }

    #[tokio::test]
    async fn test_first_shared_context_is_used() {
        let directory = FakeDirectory::with_member(USER, ContextId(5));
        directory.members.lock().insert((USER, ContextId(3)));
        let notifier = Arc::new(FakeNotifier::default());
        let policy = policy(Arc::new(directory), notifier);

        let sent = policy.request_verification(USER, "ok@b.com", None).await.unwrap();
        assert_eq!(sent.context_id, ContextId(3));

        let sent = policy
            .request_verification(USER, "ok@b.com", Some(ContextId(5)))
            .await
            .unwrap();
        assert_eq!(sent.context_id, ContextId(5));
    }

    #[tokio::test]
    async fn test_status_respects_role_removal() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        let notifier = Arc::new(FakeNotifier::default());
        let policy = policy(directory.clone(), notifier.clone());

        policy.request_verification(USER, "ok@b.com", None).await.unwrap();
        policy.submit_code(USER, &notifier.last_code()).await.unwrap();

        directory.roles.lock().clear();
        assert_eq!(policy.status(USER, None).await, VerificationStatus::NotVerified);
    }

    #[tokio::test]
    async fn test_status_without_local_record() {
        let directory = Arc::new(FakeDirectory::with_member(USER, GUILD));
        directory.roles.lock().insert((USER, GUILD));
        let policy = policy(directory, Arc::new(FakeNotifier::default()));

        assert_eq!(
            policy.status(USER, Some(GUILD)).await,
            VerificationStatus::Verified { email: None }
        );
    }

    #[test]
    fn test_admin_allowlist_operations() {
        let policy = policy(Arc::new(FakeDirectory::default()), Arc::new(FakeNotifier::default()));

        assert!(!policy.add_allowed_email("OK@B.COM"));
        assert!(policy.add_allowed_email("New@B.com"));
        assert!(!policy.add_allowed_email("new@b.com"));
        assert_eq!(policy.list_allowed_emails(), vec!["ok@b.com", "new@b.com"]);
    }
}
