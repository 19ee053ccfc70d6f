//! In-memory stand-ins for the chat platform and email provider

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use mailgate_core::{
    AllowList, BoundaryError, CodeNotifier, ContextId, MembershipDirectory, SessionConfig,
    SessionStore, UserId, VerificationCode, VerificationPolicy,
};

/// Guild membership and roles held in memory
#[derive(Default)]
pub struct FakeDirectory {
    members: Mutex<Vec<(UserId, ContextId)>>,
    roles: Mutex<HashSet<(UserId, ContextId)>>,
    names: Mutex<HashMap<ContextId, String>>,
    fail_lookups: AtomicBool,
    fail_grants: AtomicBool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a membership; contexts are reported in insertion order
    pub fn join(&self, user_id: UserId, context_id: ContextId) {
        self.members.lock().push((user_id, context_id));
    }

    pub fn name_context(&self, context_id: ContextId, name: &str) {
        self.names.lock().insert(context_id, name.to_string());
    }

    pub fn give_role(&self, user_id: UserId, context_id: ContextId) {
        self.roles.lock().insert((user_id, context_id));
    }

    /// Simulate an administrator removing the role
    pub fn revoke_role(&self, user_id: UserId, context_id: ContextId) {
        self.roles.lock().remove(&(user_id, context_id));
    }

    pub fn holds_role(&self, user_id: UserId, context_id: ContextId) -> bool {
        self.roles.lock().contains(&(user_id, context_id))
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_grants(&self, fail: bool) {
        self.fail_grants.store(fail, Ordering::SeqCst);
    }

    fn check_lookup(&self) -> Result<(), BoundaryError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            Err(BoundaryError::new("directory unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MembershipDirectory for FakeDirectory {
    async fn is_member(&self, user_id: UserId, context_id: ContextId) -> Result<bool, BoundaryError> {
        self.check_lookup()?;
        Ok(self.members.lock().contains(&(user_id, context_id)))
    }

    async fn has_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<bool, BoundaryError> {
        self.check_lookup()?;
        Ok(self.holds_role(user_id, context_id))
    }

    async fn grant_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<(), BoundaryError> {
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(BoundaryError::new("missing Manage Roles permission"));
        }
        self.give_role(user_id, context_id);
        Ok(())
    }

    async fn list_shared_contexts(&self, user_id: UserId) -> Result<Vec<ContextId>, BoundaryError> {
        self.check_lookup()?;
        Ok(self
            .members
            .lock()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, c)| *c)
            .collect())
    }

    async fn context_name(&self, context_id: ContextId) -> Result<Option<String>, BoundaryError> {
        self.check_lookup()?;
        Ok(self.names.lock().get(&context_id).cloned())
    }
}

/// Records every code it is asked to deliver
#[derive(Default)]
pub struct FakeMailer {
    outbox: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of codes delivered
    pub fn sent_count(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Most recent (email, code) pair
    pub fn last(&self) -> Option<(String, String)> {
        self.outbox.lock().last().cloned()
    }

    /// Most recent code, panicking if nothing was sent
    pub fn last_code(&self) -> String {
        self.last().map(|(_, code)| code).expect("no code was sent")
    }
}

#[async_trait]
impl CodeNotifier for FakeMailer {
    async fn send_code(&self, email: &str, code: &VerificationCode) -> Result<(), BoundaryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoundaryError::new("Resend returned 500"));
        }
        self.outbox.lock().push((email.to_string(), code.to_string()));
        Ok(())
    }
}

/// A policy wired to fresh fakes
pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub mailer: Arc<FakeMailer>,
    pub policy: Arc<VerificationPolicy>,
}

impl Harness {
    pub fn new(allowed: &[&str]) -> Self {
        Self::with_config(allowed, SessionConfig::default())
    }

    pub fn with_config(allowed: &[&str], config: SessionConfig) -> Self {
        let directory = Arc::new(FakeDirectory::new());
        let mailer = Arc::new(FakeMailer::new());
        let allowlist: AllowList = allowed.iter().collect();

        let policy = Arc::new(VerificationPolicy::new(
            Arc::new(allowlist),
            SessionStore::new(config),
            directory.clone(),
            mailer.clone(),
        ));

        Self {
            directory,
            mailer,
            policy,
        }
    }
}
