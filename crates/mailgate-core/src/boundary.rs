//! Capabilities the verification core needs from the outside world
//!
//! The chat platform and the email provider sit behind these traits so the
//! policy can be driven by real adapters in the daemon and by in-memory fakes
//! in tests.

use async_trait::async_trait;

use crate::code::VerificationCode;
use crate::error::BoundaryError;
use crate::types::{ContextId, UserId};

/// Community membership and role state on the chat platform
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Whether the user is a member of the community
    async fn is_member(&self, user_id: UserId, context_id: ContextId) -> Result<bool, BoundaryError>;

    /// Whether the user currently holds the verified role in the community
    async fn has_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<bool, BoundaryError>;

    /// Grant the verified role
    async fn grant_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<(), BoundaryError>;

    /// Communities shared by the user and the bot, in platform order
    async fn list_shared_contexts(&self, user_id: UserId) -> Result<Vec<ContextId>, BoundaryError>;

    /// Display name of the community, if the platform exposes one
    async fn context_name(&self, _context_id: ContextId) -> Result<Option<String>, BoundaryError> {
        Ok(None)
    }
}

/// Delivery of a verification code to an email address
#[async_trait]
pub trait CodeNotifier: Send + Sync {
    async fn send_code(&self, email: &str, code: &VerificationCode) -> Result<(), BoundaryError>;
}
