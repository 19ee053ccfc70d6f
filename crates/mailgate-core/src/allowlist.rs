//! Allow-list of invited email addresses
//!
//! Loaded once at startup from a line-delimited file and extended at runtime
//! by administrators. All membership checks are case-insensitive.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{info, warn};

/// Canonical form of an email address: trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shared, read-mostly set of invited emails
#[derive(Debug, Default)]
pub struct AllowList {
    inner: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    /// Insertion order, for display
    ordered: Vec<String>,
    /// Fast membership
    index: HashSet<String>,
}

impl Entries {
    fn insert(&mut self, email: String) -> bool {
        if email.is_empty() || !self.index.insert(email.clone()) {
            return false;
        }
        self.ordered.push(email);
        true
    }
}

impl AllowList {
    /// Create an empty allow-list
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file with one email per line.
    ///
    /// Blank lines are skipped. A missing file yields an empty list and a
    /// warning; any other read error is returned.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "{} not found. No emails will be allowed for verification.",
                    path.display()
                );
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };

        let list = Self::from_iter(content.lines());
        info!("Loaded {} allowed emails from {}", list.len(), path.display());
        Ok(list)
    }

    /// Check whether an email is allowed (case-insensitive)
    pub fn contains(&self, email: &str) -> bool {
        self.inner.read().index.contains(&normalize_email(email))
    }

    /// Append an email. Returns false if it was already present.
    pub fn add(&self, email: &str) -> bool {
        self.inner.write().insert(normalize_email(email))
    }

    /// Snapshot of all emails in insertion order
    pub fn list(&self) -> Vec<String> {
        self.inner.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut entries = Entries::default();
        for email in iter {
            entries.insert(normalize_email(email.as_ref()));
        }
        Self {
            inner: RwLock::new(entries),
        }
    }
}
