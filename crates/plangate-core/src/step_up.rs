//! Step-up password verification
//!
//! A workflow may demand a password before `approve` and/or `execute`. The
//! verifier compares the SHA-256 digest of the supplied password against a
//! stored digest and, on success, opens a time-boxed window bound to the
//! workflow instance. Any scoped action inside the window passes without a
//! new password.
//!
//! The digest comes from, in order: the digest frozen into the workflow at
//! `init`, or a named secret looked up through a [`SecretSource`] at guard
//! time. An explicit digest passed with a later action is ignored.

use crate::config::{
    bounded_ttl, Password, StepUpOverrides, DEFAULT_PASSWORD_HASH_ENV, DEFAULT_PASSWORD_TTL_SECONDS,
};
use crate::error::HashError;
use crate::guard::GuardFailure;
use crate::types::{AuthorizationRecord, MutatingAction};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 digest a step-up password must hash to
///
/// Stored and parsed as 64 hex characters (either case). `Debug` shows only a
/// short prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerifierHash([u8; 32]);

impl VerifierHash {
    /// Digest of a candidate password
    #[must_use]
    pub fn of_password(password: &str) -> Self {
        Self(Sha256::digest(password.as_bytes()).into())
    }

    /// Check a candidate password against this digest
    #[must_use]
    pub fn matches(&self, password: &str) -> bool {
        let candidate = Self::of_password(password);
        self.0
            .iter()
            .zip(candidate.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Lower-case hex encoding
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for VerifierHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(HashError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| HashError::InvalidHex)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for VerifierHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VerifierHash> for String {
    fn from(value: VerifierHash) -> Self {
        value.to_hex()
    }
}

impl fmt::Debug for VerifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifierHash({}..)", hex::encode(&self.0[..4]))
    }
}

/// Lookup of named secrets
pub trait SecretSource {
    /// Value of the named secret, if set
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Secrets from process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<F> SecretSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Result of a passed step-up guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepUp {
    /// Action is outside the password scope
    NotRequired,
    /// A previous verification is still valid
    WindowActive { expires_at: DateTime<Utc> },
    /// Password checked now
    Verified {
        verified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
}

impl StepUp {
    /// Record a fresh verification on the authorization record
    pub fn apply(self, record: &mut AuthorizationRecord, actor: &str) {
        if let Self::Verified {
            verified_at,
            expires_at,
        } = self
        {
            record.password_verified = true;
            record.password_verified_by = Some(actor.to_string());
            record.password_verified_at = Some(verified_at);
            record.password_expires_at = Some(expires_at);
        }
    }
}

/// Step-up guard for one invocation
#[derive(Debug)]
pub struct StepUpVerifier<'a, S: ?Sized> {
    secrets: &'a S,
    overrides: &'a StepUpOverrides,
}

impl<'a, S: SecretSource + ?Sized> StepUpVerifier<'a, S> {
    /// Create verifier with injected secret lookup and invocation overrides
    #[inline]
    #[must_use]
    pub fn new(secrets: &'a S, overrides: &'a StepUpOverrides) -> Self {
        Self { secrets, overrides }
    }

    /// Resolve the verifier digest
    ///
    /// The digest frozen at `init` always wins. An explicit digest on the
    /// invocation is never consulted here: the caller would be certifying
    /// their own password. A named secret holding something other than a
    /// 64 character hex digest counts as unresolved.
    #[must_use]
    pub fn resolve_hash(&self, record: &AuthorizationRecord) -> Option<VerifierHash> {
        if let Some(hash) = record.password_hash {
            return Some(hash);
        }
        let name = self
            .overrides
            .password_hash_env
            .as_deref()
            .or(record.password_hash_env.as_deref())
            .unwrap_or(DEFAULT_PASSWORD_HASH_ENV);
        let raw = self.secrets.lookup(name)?;
        match raw.parse() {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(secret = name, error = %e, "ignoring malformed verifier secret");
                None
            }
        }
    }

    /// Window length for a fresh verification
    ///
    /// Values outside `1..=MAX_PASSWORD_TTL_SECONDS` are skipped.
    #[must_use]
    pub fn ttl_seconds(&self, record: &AuthorizationRecord) -> u64 {
        self.overrides
            .password_ttl_seconds
            .and_then(bounded_ttl)
            .or_else(|| bounded_ttl(record.password_ttl_seconds))
            .unwrap_or(DEFAULT_PASSWORD_TTL_SECONDS)
    }

    /// Run the step-up guard
    ///
    /// # Errors
    /// - [`GuardFailure::VerifierNotConfigured`] if no digest resolves
    /// - [`GuardFailure::PasswordRequired`] if no (or a blank) password is given
    /// - [`GuardFailure::PasswordMismatch`] if the password is wrong
    pub fn check(
        &self,
        record: &AuthorizationRecord,
        action: MutatingAction,
        password: Option<&Password>,
        now: DateTime<Utc>,
    ) -> Result<StepUp, GuardFailure> {
        if !record.password_applies_to(action) {
            return Ok(StepUp::NotRequired);
        }
        if record.verification_active(now) {
            if let Some(expires_at) = record.password_expires_at {
                return Ok(StepUp::WindowActive { expires_at });
            }
        }

        let hash = self
            .resolve_hash(record)
            .ok_or(GuardFailure::VerifierNotConfigured)?;
        let password = password
            .filter(|p| !p.is_blank())
            .ok_or(GuardFailure::PasswordRequired(action))?;
        if !hash.matches(password.expose()) {
            return Err(GuardFailure::PasswordMismatch);
        }

        let expires_at = i64::try_from(self.ttl_seconds(record))
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(StepUp::Verified {
            verified_at: now,
            expires_at,
        })
    }
}
