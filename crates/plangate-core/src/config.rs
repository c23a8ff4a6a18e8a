//! Invocation configuration
//!
//! Every option a command may carry, as named and validated fields. Parsing
//! helpers here reject malformed values at the boundary instead of coercing
//! them.

use crate::error::{WorkflowError, WorkflowResult};
use crate::step_up::VerifierHash;
use crate::types::MutatingAction;
use std::fmt;
use std::path::PathBuf;

/// Default step-up window in seconds
pub const DEFAULT_PASSWORD_TTL_SECONDS: u64 = 600;

/// Longest accepted step-up window (one day)
pub const MAX_PASSWORD_TTL_SECONDS: u64 = 86_400;

/// Secret consulted for the verifier digest when none is named
pub const DEFAULT_PASSWORD_HASH_ENV: &str = "PLANGATE_APPROVAL_PASSWORD_SHA256";

/// Default location of the workflow state document
pub const DEFAULT_STATE_FILE: &str = ".plangate/approval-workflow-state.json";

/// Default location of the audit log
pub const DEFAULT_AUDIT_FILE: &str = ".plangate/approval-workflow-audit.jsonl";

/// Where the workflow is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub state_file: PathBuf,
    pub audit_file: PathBuf,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            audit_file: PathBuf::from(DEFAULT_AUDIT_FILE),
        }
    }
}

/// Candidate step-up password
///
/// Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wrap a candidate password
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for hashing only
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty or whitespace
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Step-up settings supplied with an invocation
///
/// At `init` they are frozen into the workflow. On later actions only the
/// secret name and TTL still take precedence over the frozen values; the
/// explicit digest is an `init`-only setting. TTLs outside
/// `1..=MAX_PASSWORD_TTL_SECONDS` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepUpOverrides {
    /// Force the password requirement on
    pub password_required: bool,
    pub password_scope: Option<Vec<MutatingAction>>,
    pub password_hash: Option<VerifierHash>,
    pub password_hash_env: Option<String>,
    pub password_ttl_seconds: Option<u64>,
}

impl StepUpOverrides {
    /// Force password requirement
    #[inline]
    #[must_use]
    pub fn require_password(mut self) -> Self {
        self.password_required = true;
        self
    }

    /// With password scope
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: Vec<MutatingAction>) -> Self {
        self.password_scope = Some(scope);
        self
    }

    /// With explicit verifier digest
    #[inline]
    #[must_use]
    pub fn with_hash(mut self, hash: VerifierHash) -> Self {
        self.password_hash = Some(hash);
        self
    }

    /// With named verifier secret
    #[inline]
    #[must_use]
    pub fn with_hash_env(mut self, name: impl Into<String>) -> Self {
        self.password_hash_env = Some(name.into());
        self
    }

    /// With window length
    #[inline]
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.password_ttl_seconds = Some(ttl);
        self
    }
}

/// Inputs for creating a workflow
#[derive(Debug, Clone, Default)]
pub struct InitRequest {
    pub actor: String,
    pub actor_role: Option<String>,
    pub comment: Option<String>,
    /// Replace an existing workflow
    pub force: bool,
    pub step_up: StepUpOverrides,
}

impl InitRequest {
    /// Create request for an actor
    #[inline]
    #[must_use]
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    /// Allow overwriting existing state
    #[inline]
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// With step-up overrides
    #[inline]
    #[must_use]
    pub fn with_step_up(mut self, step_up: StepUpOverrides) -> Self {
        self.step_up = step_up;
        self
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Inputs for a lifecycle transition
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub actor: String,
    pub actor_role: Option<String>,
    pub comment: Option<String>,
    pub password: Option<Password>,
    pub step_up: StepUpOverrides,
}

impl TransitionRequest {
    /// Create request for an actor
    #[inline]
    #[must_use]
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    /// With actor role
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.actor_role = Some(role.into());
        self
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// With step-up password
    #[inline]
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Password::new(password));
        self
    }

    /// With step-up overrides
    #[inline]
    #[must_use]
    pub fn with_step_up(mut self, step_up: StepUpOverrides) -> Self {
        self.step_up = step_up;
        self
    }
}

/// Parse a comma separated password scope
///
/// # Errors
/// Returns [`WorkflowError::InvalidPasswordScope`] for any token other than
/// `approve` or `execute`
pub fn parse_password_scope(raw: &str) -> WorkflowResult<Vec<MutatingAction>> {
    let mut scope = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let action = MutatingAction::parse(token)
            .filter(MutatingAction::supports_step_up)
            .ok_or_else(|| WorkflowError::InvalidPasswordScope(token.to_string()))?;
        if !scope.contains(&action) {
            scope.push(action);
        }
    }
    Ok(scope)
}

/// Validate a password TTL
///
/// # Errors
/// Returns [`WorkflowError::InvalidPasswordTtl`] unless
/// `1 <= seconds <= MAX_PASSWORD_TTL_SECONDS`
pub fn parse_password_ttl(seconds: i64) -> WorkflowResult<u64> {
    u64::try_from(seconds)
        .ok()
        .and_then(bounded_ttl)
        .ok_or(WorkflowError::InvalidPasswordTtl(seconds))
}

/// `Some(seconds)` if it is a usable window length
#[inline]
#[must_use]
pub fn bounded_ttl(seconds: u64) -> Option<u64> {
    (1..=MAX_PASSWORD_TTL_SECONDS).contains(&seconds).then_some(seconds)
}

/// Parse an explicit verifier digest
///
/// # Errors
/// Returns [`WorkflowError::InvalidPasswordHash`] unless the value is 64 hex
/// characters
pub fn parse_password_hash(raw: &str) -> WorkflowResult<VerifierHash> {
    Ok(raw.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parses_and_dedupes() {
        let scope = parse_password_scope("execute, approve,execute").unwrap();
        assert_eq!(scope, vec![MutatingAction::Execute, MutatingAction::Approve]);
    }

    #[test]
    fn scope_rejects_other_actions() {
        assert!(matches!(
            parse_password_scope("approve,archive"),
            Err(WorkflowError::InvalidPasswordScope(token)) if token == "archive"
        ));
        assert!(parse_password_scope("launch").is_err());
    }

    #[test]
    fn ttl_must_be_positive_and_bounded() {
        assert_eq!(parse_password_ttl(600).unwrap(), 600);
        assert!(parse_password_ttl(0).is_err());
        assert!(parse_password_ttl(-5).is_err());
        assert!(parse_password_ttl(i64::try_from(MAX_PASSWORD_TTL_SECONDS).unwrap() + 1).is_err());
    }

    #[test]
    fn hash_must_be_hex_digest() {
        assert!(parse_password_hash(&"a".repeat(64)).is_ok());
        assert!(matches!(
            parse_password_hash("1234"),
            Err(WorkflowError::InvalidPasswordHash(_))
        ));
    }

    #[test]
    fn password_debug_is_redacted() {
        let request = TransitionRequest::new("alice").with_password("hunter2");
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
