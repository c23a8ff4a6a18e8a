//! Workflow state machine
//!
//! Lifecycle: `draft -> submitted -> {approved, rejected} -> executed ->
//! verified -> archived`, with `rejected -> archived` as a shortcut.
//!
//! A mutating command runs its guards in a fixed order: status, role, the
//! approval gate (`execute` only), then the step-up password (`approve` and
//! `execute` only). The first failing guard blocks the transition: status is
//! kept, a blocked event is recorded, and the outcome says `blocked`.

use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::{Clock, SystemClock};
use crate::config::{InitRequest, TransitionRequest};
use crate::error::{WorkflowError, WorkflowResult};
use crate::guard::GuardFailure;
use crate::plan::{Plan, RolePolicy};
use crate::policy::{authorize_role, resolve_authorization, resolve_role_requirements, ApprovalFlags};
use crate::report::{Decision, Outcome};
use crate::step_up::{EnvSecrets, SecretSource, StepUp, StepUpVerifier};
use crate::store::WorkflowStore;
use crate::types::{
    ApprovalRecord, Command, MutatingAction, WorkflowId, WorkflowState, WorkflowStatus,
};
use chrono::{DateTime, Utc};

/// Statuses an action may start from
#[must_use]
pub const fn allowed_from(action: MutatingAction) -> &'static [WorkflowStatus] {
    use WorkflowStatus::*;
    match action {
        MutatingAction::Submit => &[Draft],
        MutatingAction::Approve | MutatingAction::Reject => &[Submitted],
        MutatingAction::Execute => &[Submitted, Approved],
        MutatingAction::Verify => &[Executed],
        MutatingAction::Archive => &[Verified, Rejected],
    }
}

/// Status an action leads to
#[must_use]
pub const fn target(action: MutatingAction) -> WorkflowStatus {
    match action {
        MutatingAction::Submit => WorkflowStatus::Submitted,
        MutatingAction::Approve => WorkflowStatus::Approved,
        MutatingAction::Reject => WorkflowStatus::Rejected,
        MutatingAction::Execute => WorkflowStatus::Executed,
        MutatingAction::Verify => WorkflowStatus::Verified,
        MutatingAction::Archive => WorkflowStatus::Archived,
    }
}

/// Status precondition check
///
/// # Errors
/// Returns [`GuardFailure::IllegalTransition`] if `action` cannot start from
/// `from`
pub fn validate_transition(
    from: WorkflowStatus,
    action: MutatingAction,
) -> Result<WorkflowStatus, GuardFailure> {
    let expected = allowed_from(action);
    if expected.contains(&from) {
        Ok(target(action))
    } else {
        Err(GuardFailure::IllegalTransition {
            action,
            status: from,
            expected,
        })
    }
}

/// Actions whose status precondition holds in `from`
#[must_use]
pub fn allowed_actions(from: WorkflowStatus) -> Vec<MutatingAction> {
    MutatingAction::ALL
        .into_iter()
        .filter(|action| allowed_from(*action).contains(&from))
        .collect()
}

/// Approval workflow engine
///
/// Owns the store, the clock and the secret lookup used by the step-up
/// guard. Each call is one load → guard → mutate → audit → persist cycle.
#[derive(Debug)]
pub struct WorkflowEngine<S, C = SystemClock, E = EnvSecrets> {
    store: S,
    clock: C,
    secrets: E,
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Create engine with the system clock and environment secrets
    #[inline]
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
            secrets: EnvSecrets,
        }
    }
}

impl<S, C, E> WorkflowEngine<S, C, E> {
    /// Replace the clock
    #[inline]
    #[must_use]
    pub fn with_clock<C2>(self, clock: C2) -> WorkflowEngine<S, C2, E> {
        WorkflowEngine {
            store: self.store,
            clock,
            secrets: self.secrets,
        }
    }

    /// Replace the secret lookup
    #[inline]
    #[must_use]
    pub fn with_secrets<E2>(self, secrets: E2) -> WorkflowEngine<S, C, E2> {
        WorkflowEngine {
            store: self.store,
            clock: self.clock,
            secrets,
        }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, C, E> WorkflowEngine<S, C, E>
where
    S: WorkflowStore,
    C: Clock,
    E: SecretSource,
{
    /// Create the workflow from a plan
    ///
    /// # Errors
    /// - [`WorkflowError::MissingArgument`] if no actor is given
    /// - [`WorkflowError::StateExists`] if state exists and `force` is unset
    /// - [`WorkflowError::InvalidPasswordHash`] if the plan embeds a bad digest
    /// - [`WorkflowError::Store`] on persistence failure
    pub fn init(
        &self,
        plan: &Plan,
        policy: Option<&RolePolicy>,
        request: &InitRequest,
    ) -> WorkflowResult<Outcome> {
        let actor = require_actor(&request.actor)?;
        if self.store.exists()? && !request.force {
            return Err(WorkflowError::StateExists(self.store.state_location()));
        }

        let flags = ApprovalFlags::evaluate(plan);
        let role_requirements = resolve_role_requirements(policy, plan);
        let authorization = resolve_authorization(plan, role_requirements, &request.step_up)?;
        let now = self.clock.now();

        let mut state = WorkflowState {
            workflow_id: WorkflowId::new(),
            plan_id: plan.plan_id.clone(),
            intent_id: plan.intent_id.clone(),
            risk_level: plan.risk_level,
            execution_mode: plan.execution_mode().to_string(),
            status: WorkflowStatus::Draft,
            approval_required: flags.approval_required,
            dual_approval_required: flags.dual_approval_required,
            privilege_escalation_detected: flags.privilege_escalation_detected,
            approvals: ApprovalRecord::new(flags.approval_required),
            authorization,
            history: Vec::new(),
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let entry = AuditEntry::initialized(actor, state.status).with_context(
            request.actor_role.as_deref(),
            request.comment.as_deref(),
        );
        AuditTrail::new(&self.store).record(&mut state, entry, now)?;
        self.store.save(&state, None)?;

        tracing::info!(
            workflow_id = %state.workflow_id,
            plan_id = state.plan_id.as_deref().unwrap_or("-"),
            risk_level = %state.risk_level,
            approval_required = state.approval_required,
            password_required = state.authorization.password_required,
            "workflow initialized"
        );

        Ok(Outcome {
            command: Command::Init,
            actor: Some(actor.to_string()),
            decision: Decision::Ok,
            reason: None,
            state,
        })
    }

    /// Read the workflow without changing it
    ///
    /// Appends nothing to history and does not rewrite the document.
    ///
    /// # Errors
    /// - [`WorkflowError::StateMissing`] if no workflow exists
    /// - [`WorkflowError::Store`] if the document cannot be read
    pub fn status(&self, actor: Option<&str>) -> WorkflowResult<Outcome> {
        let state = self.load_existing()?;
        Ok(Outcome {
            command: Command::Status,
            actor: actor.map(str::to_string),
            decision: Decision::Ok,
            reason: None,
            state,
        })
    }

    /// Attempt a lifecycle transition
    ///
    /// A guard failure is not an error: it yields a blocked [`Outcome`] and a
    /// blocked event in the history.
    ///
    /// # Errors
    /// - [`WorkflowError::MissingArgument`] if no actor is given
    /// - [`WorkflowError::StateMissing`] if no workflow exists
    /// - [`WorkflowError::Store`] on persistence failure or revision conflict
    pub fn transition(
        &self,
        action: MutatingAction,
        request: &TransitionRequest,
    ) -> WorkflowResult<Outcome> {
        let actor = require_actor(&request.actor)?;
        let mut state = self.load_existing()?;
        let loaded_revision = state.revision;
        let command = Command::Transition(action);
        let from = state.status;
        let now = self.clock.now();

        let (entry, decision, reason) = match self.evaluate_guards(&state, action, request, now) {
            Ok((to, step_up)) => {
                step_up.apply(&mut state.authorization, actor);
                match action {
                    MutatingAction::Approve => state.approvals.record_approval(actor),
                    MutatingAction::Reject => state.approvals.record_rejection(actor),
                    _ => {}
                }
                state.status = to;
                tracing::info!(
                    workflow_id = %state.workflow_id,
                    action = action.as_str(),
                    actor,
                    from = from.as_str(),
                    to = to.as_str(),
                    "transition applied"
                );
                (
                    AuditEntry::transitioned(command, actor, from, to),
                    Decision::Ok,
                    None,
                )
            }
            Err(failure) => {
                let reason = failure.to_string();
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    action = action.as_str(),
                    actor,
                    status = from.as_str(),
                    code = failure.code(),
                    "transition blocked: {reason}"
                );
                (
                    AuditEntry::blocked(command, actor, from, reason.clone()),
                    Decision::Blocked,
                    Some(reason),
                )
            }
        };

        state.updated_at = now;
        state.revision = loaded_revision + 1;
        let entry = entry.with_context(request.actor_role.as_deref(), request.comment.as_deref());
        AuditTrail::new(&self.store).record(&mut state, entry, now)?;
        self.store.save(&state, Some(loaded_revision))?;

        Ok(Outcome {
            command,
            actor: Some(actor.to_string()),
            decision,
            reason,
            state,
        })
    }

    /// Dispatch a parsed command
    ///
    /// `init` needs a plan; it is rejected here with
    /// [`WorkflowError::MissingArgument`] when none is given.
    ///
    /// # Errors
    /// As for [`init`](Self::init), [`status`](Self::status) and
    /// [`transition`](Self::transition)
    pub fn run(
        &self,
        command: Command,
        plan: Option<&Plan>,
        policy: Option<&RolePolicy>,
        init: &InitRequest,
        request: &TransitionRequest,
    ) -> WorkflowResult<Outcome> {
        match command {
            Command::Init => {
                let plan = plan.ok_or(WorkflowError::MissingArgument("plan"))?;
                self.init(plan, policy, init)
            }
            Command::Status => {
                let actor = Some(request.actor.trim()).filter(|a| !a.is_empty());
                self.status(actor)
            }
            Command::Transition(action) => self.transition(action, request),
        }
    }

    fn evaluate_guards(
        &self,
        state: &WorkflowState,
        action: MutatingAction,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<(WorkflowStatus, StepUp), GuardFailure> {
        let to = validate_transition(state.status, action)?;
        authorize_role(
            &state.authorization.role_requirements,
            action,
            request.actor_role.as_deref(),
        )?;
        if action == MutatingAction::Execute
            && state.approval_required
            && state.status != WorkflowStatus::Approved
        {
            return Err(GuardFailure::ApprovalRequired);
        }
        let step_up = if action.supports_step_up() {
            StepUpVerifier::new(&self.secrets, &request.step_up).check(
                &state.authorization,
                action,
                request.password.as_ref(),
                now,
            )?
        } else {
            StepUp::NotRequired
        };
        tracing::debug!(action = action.as_str(), ?step_up, "guards passed");
        Ok((to, step_up))
    }

    fn load_existing(&self) -> WorkflowResult<WorkflowState> {
        self.store
            .load()?
            .ok_or_else(|| WorkflowError::StateMissing(self.store.state_location()))
    }
}

fn require_actor(actor: &str) -> WorkflowResult<&str> {
    let actor = actor.trim();
    if actor.is_empty() {
        Err(WorkflowError::MissingArgument("actor"))
    } else {
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use MutatingAction::*;
        use WorkflowStatus::*;

        assert_eq!(validate_transition(Draft, Submit), Ok(Submitted));
        assert_eq!(validate_transition(Submitted, Approve), Ok(Approved));
        assert_eq!(validate_transition(Submitted, Reject), Ok(Rejected));
        assert_eq!(validate_transition(Submitted, Execute), Ok(Executed));
        assert_eq!(validate_transition(Approved, Execute), Ok(Executed));
        assert_eq!(validate_transition(Executed, Verify), Ok(Verified));
        assert_eq!(validate_transition(Verified, Archive), Ok(Archived));
        assert_eq!(validate_transition(Rejected, Archive), Ok(Archived));

        assert!(validate_transition(Draft, Execute).is_err());
        assert!(validate_transition(Rejected, Execute).is_err());
        assert!(validate_transition(Approved, Approve).is_err());
    }

    #[test]
    fn archived_is_terminal() {
        assert!(allowed_actions(WorkflowStatus::Archived).is_empty());
        assert!(WorkflowStatus::Archived.is_terminal());
    }

    #[test]
    fn allowed_actions_from_submitted() {
        assert_eq!(
            allowed_actions(WorkflowStatus::Submitted),
            vec![
                MutatingAction::Approve,
                MutatingAction::Reject,
                MutatingAction::Execute
            ]
        );
    }

    #[test]
    fn blank_actor_is_rejected() {
        assert!(matches!(
            require_actor("  "),
            Err(WorkflowError::MissingArgument("actor"))
        ));
        assert_eq!(require_actor(" alice ").unwrap(), "alice");
    }
}
