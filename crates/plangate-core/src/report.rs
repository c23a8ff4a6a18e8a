//! Command outcomes and their rendering
//!
//! The JSON payload carries a redacted copy of the workflow document: the
//! verifier digest is replaced with [`REDACTED`], and the authorization
//! summary holds only flags, scope, names and timestamps.

use crate::audit::verify_chain;
use crate::types::{Command, MutatingAction, WorkflowState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Write as _;

/// `mode` field of every payload
pub const OUTPUT_MODE: &str = "interactive-approval";

/// Placeholder for secret material in output
pub const REDACTED: &str = "[REDACTED]";

/// Result of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Ok,
    Blocked,
}

impl Decision {
    /// Process exit code for this decision
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Blocked => 2,
        }
    }

    /// Stored name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Blocked => "blocked",
        }
    }
}

/// What a command did
#[derive(Debug, Clone)]
pub struct Outcome {
    pub command: Command,
    pub actor: Option<String>,
    pub decision: Decision,
    /// Guard failure text when blocked
    pub reason: Option<String>,
    /// Workflow after the command
    pub state: WorkflowState,
}

/// Secret-free view of the authorization record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationSummary {
    pub password_required: bool,
    pub password_scope: Vec<MutatingAction>,
    /// An explicit digest is stored (a named secret may still supply one)
    pub password_hash_configured: bool,
    pub password_verified: bool,
    pub password_verified_at: Option<DateTime<Utc>>,
    pub password_verified_by: Option<String>,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub password_window_active: bool,
    pub role_restricted_actions: Vec<MutatingAction>,
}

impl Outcome {
    /// Check if a guard blocked the command
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Blocked
    }

    /// Process exit code
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.decision.exit_code()
    }

    /// Check if the audit chain in history verifies
    #[must_use]
    pub fn history_intact(&self) -> bool {
        verify_chain(&self.state.history).is_ok()
    }

    /// Authorization summary as of `now`
    #[must_use]
    pub fn authorization_summary(&self, now: DateTime<Utc>) -> AuthorizationSummary {
        let auth = &self.state.authorization;
        AuthorizationSummary {
            password_required: auth.password_required,
            password_scope: auth.password_scope.clone(),
            password_hash_configured: auth.password_hash.is_some(),
            password_verified: auth.password_verified,
            password_verified_at: auth.password_verified_at,
            password_verified_by: auth.password_verified_by.clone(),
            password_expires_at: auth.password_expires_at,
            password_window_active: auth.verification_active(now),
            role_restricted_actions: auth
                .role_requirements
                .0
                .iter()
                .filter(|(_, roles)| !roles.is_empty())
                .map(|(action, _)| *action)
                .collect(),
        }
    }

    /// Workflow document with secrets replaced
    ///
    /// # Errors
    /// Returns error if the state cannot be serialized
    pub fn redacted_state(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(&self.state)?;
        if let Some(hash) = value
            .get_mut("authorization")
            .and_then(|auth| auth.get_mut("password_hash"))
        {
            if !hash.is_null() {
                *hash = Value::String(REDACTED.to_string());
            }
        }
        Ok(value)
    }

    /// Structured output payload
    ///
    /// # Errors
    /// Returns error if the state cannot be serialized
    pub fn to_payload(&self, now: DateTime<Utc>) -> Result<Value, serde_json::Error> {
        Ok(json!({
            "mode": OUTPUT_MODE,
            "action": self.command.as_str(),
            "actor": self.actor,
            "decision": self.decision,
            "reason": self.reason,
            "state": self.redacted_state()?,
            "authorization": serde_json::to_value(self.authorization_summary(now))?,
            "history_intact": self.history_intact(),
        }))
    }

    /// Human-readable summary
    #[must_use]
    pub fn render_text(&self, now: DateTime<Utc>) -> String {
        let state = &self.state;
        let summary = self.authorization_summary(now);
        let mut out = String::new();

        let _ = writeln!(out, "Approval workflow {}", state.workflow_id);
        let _ = writeln!(out, "  action:    {}", self.command);
        if let Some(actor) = &self.actor {
            let _ = writeln!(out, "  actor:     {actor}");
        }
        let _ = writeln!(out, "  decision:  {}", self.decision.as_str());
        if let Some(reason) = &self.reason {
            let _ = writeln!(out, "  reason:    {reason}");
        }
        let _ = writeln!(out, "  status:    {}", state.status);
        let _ = writeln!(
            out,
            "  plan:      {} (risk {}, mode {})",
            state.plan_id.as_deref().unwrap_or("-"),
            state.risk_level,
            state.execution_mode
        );

        let approvers = if state.approvals.approvers.is_empty() {
            "none".to_string()
        } else {
            state.approvals.approvers.join(", ")
        };
        let _ = writeln!(
            out,
            "  approval:  {} (required: {}, dual: {}), approvers: {approvers}",
            state.approvals.status, state.approval_required, state.dual_approval_required
        );

        if summary.password_required {
            let scope = summary
                .password_scope
                .iter()
                .map(MutatingAction::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let window = match (summary.password_window_active, summary.password_expires_at) {
                (true, Some(expires)) => format!("verified until {}", expires.to_rfc3339()),
                (false, Some(expires)) => format!("expired at {}", expires.to_rfc3339()),
                _ => "not verified".to_string(),
            };
            let _ = writeln!(out, "  password:  required for {scope}; {window}");
        } else {
            let _ = writeln!(out, "  password:  not required");
        }

        let _ = writeln!(
            out,
            "  history:   {} events (chain {})",
            state.history.len(),
            if self.history_intact() { "intact" } else { "BROKEN" }
        );
        out
    }
}
