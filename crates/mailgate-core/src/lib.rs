//! Mailgate Core - Email-gated verification sessions
//!
//! This crate provides the state and policy behind Mailgate's verification
//! flow: the allow-list of invited addresses, one-time code generation, the
//! pending-session store with timed expiry, and the orchestration that ties
//! them to the chat platform and email delivery boundaries.

pub mod allowlist;
pub mod boundary;
pub mod code;
pub mod error;
pub mod policy;
pub mod session;
pub mod types;
pub mod verified;

pub use allowlist::{normalize_email, AllowList};
pub use boundary::{CodeNotifier, MembershipDirectory};
pub use code::VerificationCode;
pub use error::{BoundaryError, Result, VerifyError};
pub use policy::{CodeSent, Verified, VerificationPolicy, VerificationStatus};
pub use session::{ConsumedSession, PendingSession, SessionConfig, SessionStore};
pub use types::{ContextId, SessionId, UserId};
pub use verified::{VerifiedRecord, VerifiedRegistry};

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 6;

/// Default lifetime of a pending verification session in seconds
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;

/// Longest session lifetime a store will schedule, in seconds
pub const MAX_SESSION_TTL_SECS: u64 = 86_400;

/// Default name of the role granted on successful verification
pub const DEFAULT_VERIFIED_ROLE: &str = "verified";
