//! One-time verification codes

use std::fmt;

use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::CODE_LENGTH;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// A six-digit numeric code, the shared secret of one verification attempt.
///
/// The value never has a leading zero, so the string form is always exactly
/// [`CODE_LENGTH`] characters.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Draw a fresh code from the operating system CSPRNG
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Draw a code from the given RNG
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let value = rng.gen_range(CODE_MIN..=CODE_MAX);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, constant-time comparison against a user submission
    pub fn matches(&self, submitted: &str) -> bool {
        self.0.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep codes out of debug logs.
impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationCode({})", "*".repeat(CODE_LENGTH))
    }
}
