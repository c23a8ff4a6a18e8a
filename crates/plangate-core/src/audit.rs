//! Audit trail
//!
//! Every `init` and every attempted transition, blocked or not, becomes one
//! [`WorkflowEvent`]. Events are sealed into a SHA-256 hash chain, appended to
//! the workflow's in-document history, and written to the append-only audit
//! log through the store. Events never carry passwords or verifier digests.

use crate::error::StoreError;
use crate::store::WorkflowStore;
use crate::types::{Command, EventId, WorkflowId, WorkflowState, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `prev_hash` of the first event
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "workflow.initialized")]
    Initialized,
    #[serde(rename = "workflow.transitioned")]
    Transitioned,
    #[serde(rename = "workflow.blocked")]
    Blocked,
}

impl EventType {
    /// Stored name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "workflow.initialized",
            Self::Transitioned => "workflow.transitioned",
            Self::Blocked => "workflow.blocked",
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_id: EventId,
    pub workflow_id: WorkflowId,
    pub event_type: EventType,
    pub action: String,
    pub actor: String,
    pub actor_role: Option<String>,
    pub comment: Option<String>,
    /// `None` only for the init event
    pub from_status: Option<WorkflowStatus>,
    pub to_status: WorkflowStatus,
    pub blocked: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub hash: String,
}

/// Unsealed event content
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub event_type: EventType,
    pub command: Command,
    pub actor: String,
    pub actor_role: Option<String>,
    pub comment: Option<String>,
    pub from_status: Option<WorkflowStatus>,
    pub to_status: WorkflowStatus,
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Workflow created
    #[must_use]
    pub fn initialized(actor: &str, status: WorkflowStatus) -> Self {
        Self {
            event_type: EventType::Initialized,
            command: Command::Init,
            actor: actor.to_string(),
            actor_role: None,
            comment: None,
            from_status: None,
            to_status: status,
            reason: None,
        }
    }

    /// Transition committed
    #[must_use]
    pub fn transitioned(
        command: Command,
        actor: &str,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Self {
        Self {
            event_type: EventType::Transitioned,
            command,
            actor: actor.to_string(),
            actor_role: None,
            comment: None,
            from_status: Some(from),
            to_status: to,
            reason: None,
        }
    }

    /// Transition refused; status unchanged
    #[must_use]
    pub fn blocked(
        command: Command,
        actor: &str,
        status: WorkflowStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::Blocked,
            command,
            actor: actor.to_string(),
            actor_role: None,
            comment: None,
            from_status: Some(status),
            to_status: status,
            reason: Some(reason.into()),
        }
    }

    /// With actor role and comment
    #[must_use]
    pub fn with_context(mut self, actor_role: Option<&str>, comment: Option<&str>) -> Self {
        self.actor_role = actor_role.map(str::to_string);
        self.comment = comment.map(str::to_string);
        self
    }

    /// Seal into an event chained onto `prev_hash`
    #[must_use]
    pub fn seal(
        self,
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
        prev_hash: &str,
    ) -> WorkflowEvent {
        let mut event = WorkflowEvent {
            event_id: EventId::new(),
            workflow_id,
            event_type: self.event_type,
            action: self.command.as_str().to_string(),
            actor: self.actor,
            actor_role: self.actor_role,
            comment: self.comment,
            from_status: self.from_status,
            blocked: self.event_type == EventType::Blocked,
            to_status: self.to_status,
            reason: self.reason,
            timestamp,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        event.hash = compute_hash(&event);
        event
    }
}

/// Writes events to history and to the audit log
#[derive(Debug)]
pub struct AuditTrail<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: WorkflowStore + ?Sized> AuditTrail<'a, S> {
    /// Create trail over a store
    #[inline]
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Seal an entry, append it to the audit log, then to `state.history`
    ///
    /// # Errors
    /// Returns [`StoreError`] if the audit log append fails; history is left
    /// untouched in that case
    pub fn record(
        &self,
        state: &mut WorkflowState,
        entry: AuditEntry,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let prev_hash = state
            .history
            .last()
            .map_or(GENESIS_HASH, |e| e.hash.as_str())
            .to_string();
        let event = entry.seal(state.workflow_id, timestamp, &prev_hash);
        self.store.append_event(&event)?;
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            action = %event.action,
            "audit event recorded"
        );
        state.history.push(event);
        Ok(())
    }
}

/// Audit chain verification failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// `prev_hash` does not point at the preceding event
    #[error("broken link at event {index}")]
    BrokenLink { index: usize },

    /// Event content does not match its hash
    #[error("hash mismatch at event {index}")]
    HashMismatch { index: usize },
}

/// Verify the hash chain of a history
///
/// # Errors
/// Returns the first [`ChainError`] found
pub fn verify_chain(history: &[WorkflowEvent]) -> Result<(), ChainError> {
    let mut prev = GENESIS_HASH;
    for (index, event) in history.iter().enumerate() {
        if event.prev_hash != prev {
            return Err(ChainError::BrokenLink { index });
        }
        if event.hash != compute_hash(event) {
            return Err(ChainError::HashMismatch { index });
        }
        prev = &event.hash;
    }
    Ok(())
}

fn compute_hash(event: &WorkflowEvent) -> String {
    fn field(hasher: &mut Sha256, value: &str) {
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    fn optional(hasher: &mut Sha256, value: Option<&str>) {
        match value {
            Some(v) => {
                hasher.update([1]);
                field(hasher, v);
            }
            None => hasher.update([0]),
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(event.event_id.0.to_bytes());
    hasher.update(event.workflow_id.0.as_bytes());
    field(&mut hasher, event.event_type.as_str());
    field(&mut hasher, &event.action);
    field(&mut hasher, &event.actor);
    optional(&mut hasher, event.actor_role.as_deref());
    optional(&mut hasher, event.comment.as_deref());
    optional(&mut hasher, event.from_status.as_ref().map(WorkflowStatus::as_str));
    field(&mut hasher, event.to_status.as_str());
    hasher.update([u8::from(event.blocked)]);
    optional(&mut hasher, event.reason.as_deref());
    hasher.update(event.timestamp.timestamp().to_le_bytes());
    hasher.update(event.timestamp.timestamp_subsec_nanos().to_le_bytes());
    field(&mut hasher, &event.prev_hash);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MutatingAction;
    use chrono::TimeZone;

    fn chain() -> Vec<WorkflowEvent> {
        let id = WorkflowId::new();
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let first = AuditEntry::initialized("alice", WorkflowStatus::Draft).seal(id, t, GENESIS_HASH);
        let second = AuditEntry::blocked(
            Command::Transition(MutatingAction::Execute),
            "bob",
            WorkflowStatus::Draft,
            "cannot execute when status is draft; expected submitted, approved",
        )
        .with_context(Some("operator"), Some("trying early"))
        .seal(id, t, &first.hash);
        vec![first, second]
    }

    #[test]
    fn blocked_event_keeps_status() {
        let events = chain();
        let blocked = &events[1];
        assert!(blocked.blocked);
        assert_eq!(blocked.event_type, EventType::Blocked);
        assert_eq!(blocked.from_status, Some(blocked.to_status));
        assert_eq!(blocked.action, "execute");
        assert_eq!(blocked.actor_role.as_deref(), Some("operator"));
    }

    #[test]
    fn init_event_has_no_from_status() {
        let events = chain();
        assert_eq!(events[0].from_status, None);
        assert_eq!(events[0].prev_hash, GENESIS_HASH);
        assert!(!events[0].blocked);
    }

    #[test]
    fn intact_chain_verifies() {
        assert_eq!(verify_chain(&chain()), Ok(()));
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn tampered_reason_is_detected() {
        let mut events = chain();
        events[1].reason = Some("nothing to see".to_string());
        assert_eq!(verify_chain(&events), Err(ChainError::HashMismatch { index: 1 }));
    }

    #[test]
    fn removed_event_is_detected() {
        let mut events = chain();
        events.remove(0);
        assert_eq!(verify_chain(&events), Err(ChainError::BrokenLink { index: 0 }));
    }

    #[test]
    fn event_round_trips_through_json() {
        let events = chain();
        let line = serde_json::to_string(&events[1]).unwrap();
        assert!(line.contains("\"workflow.blocked\""));
        let back: WorkflowEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, events[1]);
        assert_eq!(verify_chain(&[events[0].clone(), back]), Ok(()));
    }
}
