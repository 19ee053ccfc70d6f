//! Record of successful verifications

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{ContextId, UserId};

/// Email a user proved control of, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRecord {
    pub email: String,
    pub context_id: ContextId,
    pub verified_at: DateTime<Utc>,
}

/// In-memory map of verified users.
///
/// Used for display only; role membership on the chat platform is the
/// authority on whether someone is verified.
#[derive(Debug, Default)]
pub struct VerifiedRegistry {
    records: RwLock<HashMap<UserId, VerifiedRecord>>,
}

impl VerifiedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) a successful verification
    pub fn record(&self, user_id: UserId, email: String, context_id: ContextId) -> VerifiedRecord {
        let record = VerifiedRecord {
            email,
            context_id,
            verified_at: Utc::now(),
        };
        self.records.write().insert(user_id, record.clone());
        record
    }

    /// Verified email for a user, if known
    pub fn email(&self, user_id: UserId) -> Option<String> {
        self.records.read().get(&user_id).map(|r| r.email.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
