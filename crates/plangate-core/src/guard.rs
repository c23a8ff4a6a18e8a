//! Guard failures
//!
//! A guard failure blocks a transition without aborting the command. Its
//! `Display` text is the `reason` recorded on the blocked event, so the
//! messages are part of the audit contract.

use crate::types::{MutatingAction, WorkflowStatus};

/// Reason a transition was blocked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardFailure {
    /// Action is not allowed from the current status
    #[error("cannot {action} when status is {status}; expected {}", join_statuses(.expected))]
    IllegalTransition {
        action: MutatingAction,
        status: WorkflowStatus,
        expected: &'static [WorkflowStatus],
    },

    /// Action is role restricted and no role was supplied
    #[error("actor role is required for {action}; allowed roles: {}", .allowed.join(", "))]
    RoleRequired {
        action: MutatingAction,
        allowed: Vec<String>,
    },

    /// Supplied role is not in the allowed set
    #[error("actor role '{role}' is not allowed to {action}; allowed roles: {}", .allowed.join(", "))]
    RoleNotAllowed {
        role: String,
        action: MutatingAction,
        allowed: Vec<String>,
    },

    /// Execute attempted before a required approval
    #[error("approval required before execute")]
    ApprovalRequired,

    /// Step-up applies but no verifier hash can be resolved
    #[error("password authorization required but verifier hash is not configured")]
    VerifierNotConfigured,

    /// Step-up applies and no password was supplied
    #[error("password authorization required for {0}")]
    PasswordRequired(MutatingAction),

    /// Supplied password does not match
    #[error("password authorization failed")]
    PasswordMismatch,
}

impl GuardFailure {
    /// Short machine-readable code for log fields
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::RoleRequired { .. } => "role_required",
            Self::RoleNotAllowed { .. } => "role_not_allowed",
            Self::ApprovalRequired => "approval_required",
            Self::VerifierNotConfigured => "verifier_not_configured",
            Self::PasswordRequired(_) => "password_required",
            Self::PasswordMismatch => "password_mismatch",
        }
    }
}

fn join_statuses(statuses: &[WorkflowStatus]) -> String {
    statuses
        .iter()
        .map(WorkflowStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
