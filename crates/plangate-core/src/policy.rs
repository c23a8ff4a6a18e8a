//! Approval and authorization policy
//!
//! Everything here runs once, when a workflow is created, and the results are
//! frozen into the workflow document:
//! - approval flags derived from the plan's risk and actions
//! - the merged `action -> allowed roles` mapping
//! - the step-up password requirement
//!
//! The role guard itself ([`authorize_role`]) runs on every transition.

use crate::config::{bounded_ttl, StepUpOverrides, DEFAULT_PASSWORD_TTL_SECONDS};
use crate::error::WorkflowResult;
use crate::guard::GuardFailure;
use crate::plan::{Plan, RolePolicy};
use crate::step_up::VerifierHash;
use crate::types::{AuthorizationRecord, MutatingAction, RiskLevel, RoleRequirements};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Execution mode that applies changes directly
pub const APPLY_MODE: &str = "apply";

/// Plan action type that never changes anything
pub const ANALYSIS_ONLY_ACTION: &str = "analysis_only";

/// Approval flags computed from a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApprovalFlags {
    pub approval_required: bool,
    pub dual_approval_required: bool,
    pub privilege_escalation_detected: bool,
}

impl ApprovalFlags {
    /// Evaluate a plan
    ///
    /// Approval is mandatory for high risk, for any privilege escalation, and
    /// when the plan itself already carries a pending or approved approval.
    /// Dual approval is recorded but not enforced by any guard.
    #[must_use]
    pub fn evaluate(plan: &Plan) -> Self {
        let privilege_escalation_detected = plan
            .actions
            .iter()
            .any(|action| action.requires_privilege_escalation);
        let embedded_approval = plan
            .approval
            .status
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .is_some_and(|s| s == "pending" || s == "approved");

        Self {
            approval_required: plan.risk_level == RiskLevel::High
                || privilege_escalation_detected
                || embedded_approval,
            dual_approval_required: !plan.approval.dual_approved && privilege_escalation_detected,
            privilege_escalation_detected,
        }
    }
}

/// Merge role requirements from an external policy and the plan
///
/// The plan's entry for an action replaces the policy's entry for that
/// action. Unknown action keys are dropped; role names are trimmed,
/// lower-cased and de-duplicated in first-seen order.
#[must_use]
pub fn resolve_role_requirements(policy: Option<&RolePolicy>, plan: &Plan) -> RoleRequirements {
    let mut merged = BTreeMap::new();
    if let Some(policy) = policy {
        overlay(&mut merged, &policy.role_requirements);
    }
    overlay(&mut merged, &plan.authorization.role_requirements);
    RoleRequirements(merged)
}

fn overlay(target: &mut BTreeMap<MutatingAction, Vec<String>>, source: &Map<String, Value>) {
    for (key, value) in source {
        match MutatingAction::parse(key) {
            Some(action) => {
                target.insert(action, normalize_roles(value));
            }
            None => tracing::debug!(key = %key, "dropping role requirement for unknown action"),
        }
    }
}

fn normalize_roles(value: &Value) -> Vec<String> {
    let raw: Vec<&str> = match value {
        Value::String(role) => vec![role.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let mut roles: Vec<String> = Vec::with_capacity(raw.len());
    for role in raw {
        let role = role.trim().to_lowercase();
        if !role.is_empty() && !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}

/// Role guard
///
/// Passes when the action has no (or an empty) role list.
///
/// # Errors
/// - [`GuardFailure::RoleRequired`] if a role is needed but none was given
/// - [`GuardFailure::RoleNotAllowed`] if the role is not in the allowed set
pub fn authorize_role(
    requirements: &RoleRequirements,
    action: MutatingAction,
    actor_role: Option<&str>,
) -> Result<(), GuardFailure> {
    let Some(allowed) = requirements.allowed_for(action) else {
        return Ok(());
    };
    let role = actor_role
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| GuardFailure::RoleRequired {
            action,
            allowed: allowed.to_vec(),
        })?;
    let normalized = role.to_lowercase();
    if allowed.iter().any(|a| *a == normalized) {
        Ok(())
    } else {
        Err(GuardFailure::RoleNotAllowed {
            role: role.to_string(),
            action,
            allowed: allowed.to_vec(),
        })
    }
}

/// Check if a plan applies real changes
///
/// True in `apply` mode when at least one action is more than analysis.
#[must_use]
pub fn applies_changes(plan: &Plan) -> bool {
    plan.execution_mode() == APPLY_MODE
        && plan
            .actions
            .iter()
            .any(|action| action.action_type.trim() != ANALYSIS_ONLY_ACTION)
}

/// Build the authorization record for a new workflow
///
/// # Errors
/// Returns [`WorkflowError::InvalidPasswordHash`](crate::WorkflowError::InvalidPasswordHash)
/// if the plan embeds a malformed digest and no override replaces it
pub fn resolve_authorization(
    plan: &Plan,
    role_requirements: RoleRequirements,
    overrides: &StepUpOverrides,
) -> WorkflowResult<AuthorizationRecord> {
    let embedded = &plan.authorization;
    let password_required =
        overrides.password_required || embedded.password_required || applies_changes(plan);

    let mut password_scope = match &overrides.password_scope {
        Some(scope) if !scope.is_empty() => scope.clone(),
        _ => embedded_scope(&embedded.password_scope),
    };
    if password_required && password_scope.is_empty() {
        password_scope.push(MutatingAction::Execute);
    }

    let password_hash = match overrides.password_hash {
        Some(hash) => Some(hash),
        None => embedded
            .password_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::parse::<VerifierHash>)
            .transpose()?,
    };

    let password_hash_env = overrides.password_hash_env.clone().or_else(|| {
        embedded
            .password_hash_env
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    });

    let password_ttl_seconds = overrides
        .password_ttl_seconds
        .and_then(bounded_ttl)
        .or_else(|| {
            embedded
                .password_ttl_seconds
                .and_then(|ttl| u64::try_from(ttl).ok())
                .and_then(bounded_ttl)
        })
        .unwrap_or(DEFAULT_PASSWORD_TTL_SECONDS);

    Ok(AuthorizationRecord {
        password_required,
        password_scope,
        password_hash,
        password_hash_env,
        password_ttl_seconds,
        password_verified: false,
        password_verified_at: None,
        password_verified_by: None,
        password_expires_at: None,
        reason_codes: embedded.reason_codes.clone(),
        role_requirements,
    })
}

fn embedded_scope(raw: &[String]) -> Vec<MutatingAction> {
    let mut scope = Vec::new();
    for action in raw
        .iter()
        .filter_map(|token| MutatingAction::parse(token))
        .filter(MutatingAction::supports_step_up)
    {
        if !scope.contains(&action) {
            scope.push(action);
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use serde_json::json;
    use std::path::Path;

    fn plan(value: Value) -> Plan {
        Plan::from_value(value, Path::new("plan.json")).unwrap()
    }

    fn policy(value: Value) -> RolePolicy {
        RolePolicy::from_value(value, Path::new("policy.json")).unwrap()
    }

    #[test]
    fn high_risk_requires_approval() {
        let flags = ApprovalFlags::evaluate(&plan(json!({"risk_level": "high"})));
        assert!(flags.approval_required);
        assert!(!flags.privilege_escalation_detected);
        assert!(!flags.dual_approval_required);
    }

    #[test]
    fn escalation_requires_approval_and_dual_approval() {
        let flags = ApprovalFlags::evaluate(&plan(json!({
            "risk_level": "low",
            "actions": [{"type": "deploy", "requires_privilege_escalation": true}]
        })));
        assert!(flags.privilege_escalation_detected);
        assert!(flags.approval_required);
        assert!(flags.dual_approval_required);
    }

    #[test]
    fn dual_approved_plan_clears_dual_flag() {
        let flags = ApprovalFlags::evaluate(&plan(json!({
            "actions": [{"type": "deploy", "requires_privilege_escalation": true}],
            "approval": {"dual_approved": true}
        })));
        assert!(!flags.dual_approval_required);
    }

    #[test]
    fn embedded_approval_status_requires_approval() {
        for status in ["pending", "Approved"] {
            let flags = ApprovalFlags::evaluate(&plan(json!({
                "risk_level": "low",
                "approval": {"status": status}
            })));
            assert!(flags.approval_required, "status {status}");
        }
        let flags = ApprovalFlags::evaluate(&plan(json!({
            "risk_level": "low",
            "approval": {"status": "not-required"}
        })));
        assert!(!flags.approval_required);
    }

    #[test]
    fn plan_roles_override_policy_per_action() {
        let policy = policy(json!({
            "approve": ["Release-Manager", "security"],
            "execute": ["operator"],
            "rollback": ["anyone"]
        }));
        let plan = plan(json!({
            "authorization": {"role_requirements": {"execute": ["SRE", "sre", " "], "bogus": ["x"]}}
        }));

        let merged = resolve_role_requirements(Some(&policy), &plan);

        assert_eq!(
            merged.allowed_for(MutatingAction::Approve).unwrap(),
            ["release-manager".to_string(), "security".to_string()]
        );
        assert_eq!(
            merged.allowed_for(MutatingAction::Execute).unwrap(),
            ["sre".to_string()]
        );
        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn single_string_role_is_accepted() {
        let merged = resolve_role_requirements(Some(&policy(json!({"verify": "QA"}))), &Plan::default());
        assert_eq!(merged.allowed_for(MutatingAction::Verify).unwrap(), ["qa".to_string()]);
    }

    #[test]
    fn role_guard_behaviour() {
        let merged = resolve_role_requirements(
            Some(&policy(json!({"approve": ["release-manager"]}))),
            &Plan::default(),
        );

        assert!(authorize_role(&merged, MutatingAction::Submit, None).is_ok());
        assert!(authorize_role(&merged, MutatingAction::Approve, Some("Release-Manager")).is_ok());
        assert!(matches!(
            authorize_role(&merged, MutatingAction::Approve, Some("engineer")),
            Err(GuardFailure::RoleNotAllowed { .. })
        ));
        assert!(matches!(
            authorize_role(&merged, MutatingAction::Approve, None),
            Err(GuardFailure::RoleRequired { .. })
        ));
    }

    #[test]
    fn apply_mode_with_real_actions_requires_password() {
        let plan = plan(json!({
            "execution_mode": "apply",
            "actions": [{"type": "analysis_only"}, {"type": "write_file"}]
        }));
        let auth = resolve_authorization(&plan, RoleRequirements::default(), &StepUpOverrides::default())
            .unwrap();
        assert!(auth.password_required);
        assert_eq!(auth.password_scope, vec![MutatingAction::Execute]);
        assert_eq!(auth.password_ttl_seconds, DEFAULT_PASSWORD_TTL_SECONDS);
    }

    #[test]
    fn analysis_only_apply_plan_needs_no_password() {
        let plan = plan(json!({
            "execution_mode": "apply",
            "actions": [{"type": "analysis_only"}]
        }));
        let auth = resolve_authorization(&plan, RoleRequirements::default(), &StepUpOverrides::default())
            .unwrap();
        assert!(!auth.password_required);
        assert!(auth.password_scope.is_empty());
    }

    #[test]
    fn overrides_win_over_plan() {
        let plan = plan(json!({
            "authorization": {
                "password_required": true,
                "password_scope": ["approve", "archive"],
                "password_ttl_seconds": 120,
                "password_hash_env": "PLAN_SECRET",
                "reason_codes": ["prod-touch"]
            }
        }));
        let auth = resolve_authorization(&plan, RoleRequirements::default(), &StepUpOverrides::default())
            .unwrap();
        assert_eq!(auth.password_scope, vec![MutatingAction::Approve]);
        assert_eq!(auth.password_ttl_seconds, 120);
        assert_eq!(auth.password_hash_env.as_deref(), Some("PLAN_SECRET"));
        assert_eq!(auth.reason_codes, vec!["prod-touch".to_string()]);

        let overrides = StepUpOverrides::default()
            .with_scope(vec![MutatingAction::Approve, MutatingAction::Execute])
            .with_ttl_seconds(30)
            .with_hash_env("CLI_SECRET");
        let auth = resolve_authorization(&plan, RoleRequirements::default(), &overrides).unwrap();
        assert_eq!(auth.password_scope.len(), 2);
        assert_eq!(auth.password_ttl_seconds, 30);
        assert_eq!(auth.password_hash_env.as_deref(), Some("CLI_SECRET"));
    }

    #[test]
    fn out_of_range_plan_ttl_uses_default() {
        let plan = plan(json!({"authorization": {"password_ttl_seconds": -4}}));
        let auth = resolve_authorization(&plan, RoleRequirements::default(), &StepUpOverrides::default())
            .unwrap();
        assert_eq!(auth.password_ttl_seconds, DEFAULT_PASSWORD_TTL_SECONDS);
    }

    #[test]
    fn malformed_plan_hash_is_configuration_error() {
        let plan = plan(json!({"authorization": {"password_hash": "nothex"}}));
        let err = resolve_authorization(&plan, RoleRequirements::default(), &StepUpOverrides::default())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPasswordHash(_)));
    }
}
