//! Core types for the approval workflow
//!
//! Defines the persisted workflow document and the closed sets it is built
//! from:
//! - lifecycle status and the mutating actions that move it
//! - approval and authorization sub-records
//! - workflow and event identifiers

use crate::audit::WorkflowEvent;
use crate::error::WorkflowError;
use crate::step_up::VerifierHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

/// Unique workflow identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Generate new workflow ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique event identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Ulid);

impl EventId {
    /// Generate new event ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Parse leniently: anything unrecognised is `Medium`
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Lifecycle status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Executed,
    Verified,
    Archived,
}

impl WorkflowStatus {
    /// Status name as stored in documents
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Verified => "verified",
            Self::Archived => "archived",
        }
    }

    /// Check if no action can leave this status
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that move a workflow through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutatingAction {
    Submit,
    Approve,
    Reject,
    Execute,
    Verify,
    Archive,
}

impl MutatingAction {
    /// Every mutating action
    pub const ALL: [MutatingAction; 6] = [
        Self::Submit,
        Self::Approve,
        Self::Reject,
        Self::Execute,
        Self::Verify,
        Self::Archive,
    ];

    /// Action name as used on the command line and in documents
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Execute => "execute",
            Self::Verify => "verify",
            Self::Archive => "archive",
        }
    }

    /// Parse an exact (case-insensitive) action name
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(raw))
    }

    /// Check if the action may be protected by a step-up password
    #[inline]
    #[must_use]
    pub fn supports_step_up(&self) -> bool {
        matches!(self, Self::Approve | Self::Execute)
    }
}

impl fmt::Display for MutatingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow command: creation, observation or a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Create the workflow from a plan
    Init,
    /// Read the current state without changing it
    Status,
    /// Attempt a lifecycle transition
    Transition(MutatingAction),
}

impl Command {
    /// Command name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Status => "status",
            Self::Transition(action) => action.as_str(),
        }
    }

    /// Check if the command requires an actor
    #[inline]
    #[must_use]
    pub fn requires_actor(&self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl FromStr for Command {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "status" => Ok(Self::Status),
            other => MutatingAction::parse(other)
                .map(Self::Transition)
                .ok_or_else(|| WorkflowError::UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval decision status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    NotRequired,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::NotRequired => "not-required",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// Approval sub-record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub status: ApprovalStatus,
    /// Actors who approved, in order, without duplicates
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub rejected_by: Option<String>,
}

impl ApprovalRecord {
    /// Create record for a new workflow
    #[inline]
    #[must_use]
    pub fn new(approval_required: bool) -> Self {
        Self {
            status: if approval_required {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::NotRequired
            },
            approvers: Vec::new(),
            rejected_by: None,
        }
    }

    /// Record an approval; an actor is listed at most once
    pub fn record_approval(&mut self, actor: &str) {
        if !self.approvers.iter().any(|a| a == actor) {
            self.approvers.push(actor.to_string());
        }
        self.status = ApprovalStatus::Approved;
        self.rejected_by = None;
    }

    /// Record a rejection
    pub fn record_rejection(&mut self, actor: &str) {
        self.status = ApprovalStatus::Rejected;
        self.rejected_by = Some(actor.to_string());
    }
}

/// Frozen `action -> allowed roles` mapping
///
/// Role names are lower-cased and unique within each list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleRequirements(pub BTreeMap<MutatingAction, Vec<String>>);

impl RoleRequirements {
    /// Roles allowed for an action; `None` when unrestricted
    #[must_use]
    pub fn allowed_for(&self, action: MutatingAction) -> Option<&[String]> {
        self.0
            .get(&action)
            .map(Vec::as_slice)
            .filter(|roles| !roles.is_empty())
    }
}

/// Authorization sub-record
///
/// The `password_verified*` fields change only after a successful step-up
/// check; everything else is fixed when the workflow is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub password_required: bool,
    #[serde(default)]
    pub password_scope: Vec<MutatingAction>,
    #[serde(default)]
    pub password_hash: Option<VerifierHash>,
    #[serde(default)]
    pub password_hash_env: Option<String>,
    pub password_ttl_seconds: u64,
    #[serde(default)]
    pub password_verified: bool,
    #[serde(default)]
    pub password_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_verified_by: Option<String>,
    #[serde(default)]
    pub password_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub role_requirements: RoleRequirements,
}

impl AuthorizationRecord {
    /// Check if a step-up password applies to this action
    #[inline]
    #[must_use]
    pub fn password_applies_to(&self, action: MutatingAction) -> bool {
        self.password_required && self.password_scope.contains(&action)
    }

    /// Check if a previous verification is still inside its window
    #[must_use]
    pub fn verification_active(&self, now: DateTime<Utc>) -> bool {
        self.password_verified && self.password_expires_at.is_some_and(|exp| now < exp)
    }
}

/// The persisted workflow document (aggregate root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub plan_id: Option<String>,
    pub intent_id: Option<String>,
    pub risk_level: RiskLevel,
    pub execution_mode: String,
    pub status: WorkflowStatus,
    pub approval_required: bool,
    pub dual_approval_required: bool,
    pub privilege_escalation_detected: bool,
    pub approvals: ApprovalRecord,
    pub authorization: AuthorizationRecord,
    #[serde(default)]
    pub history: Vec<WorkflowEvent>,
    /// Incremented on every persisted mutation
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Last recorded event, if any
    #[inline]
    #[must_use]
    pub fn last_event(&self) -> Option<&WorkflowEvent> {
        self.history.last()
    }
}
