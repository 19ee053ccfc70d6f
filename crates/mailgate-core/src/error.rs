//! Error types for Mailgate verification

use thiserror::Error;

/// Result type alias for verification operations
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Reasons a verification step can fail.
///
/// Every variant is recoverable by the user and maps to a plain message in the
/// presentation layer. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Email is not on the allow-list
    #[error("Email address is not invited")]
    NotInvited,

    /// User shares no eligible community with the bot
    #[error("User shares no community with the bot")]
    NoSharedContext,

    /// User already holds the verified role in the target community
    #[error("User is already verified")]
    AlreadyVerified,

    /// Code could not be delivered (or an eligibility lookup failed)
    #[error("Failed to deliver verification code")]
    DeliveryFailed,

    /// No pending session for the user
    #[error("No pending verification")]
    NoPendingSession,

    /// Submitted code does not match
    #[error("Invalid verification code")]
    CodeMismatch,

    /// Session deadline has passed
    #[error("Verification code expired")]
    Expired,

    /// Code matched but the role could not be granted
    #[error("Failed to grant verified role")]
    RoleGrantFailed,

    /// Too many wrong codes for this session; it has been discarded
    #[error("Too many invalid attempts")]
    AttemptsExhausted,
}

/// Opaque failure reported by an external collaborator (email provider,
/// chat platform). Logged, never shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BoundaryError(pub String);

impl BoundaryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
