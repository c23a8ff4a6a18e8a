//! External input documents
//!
//! A [`Plan`] is produced upstream by the planning agent and a [`RolePolicy`]
//! by whoever operates the pipeline. Both are read-only here and parsed
//! leniently: every field is optional (an explicit `null` reads as absent),
//! unknown fields are ignored, and an unrecognised risk level falls back to
//! `medium`.

use crate::error::{WorkflowError, WorkflowResult};
use crate::types::RiskLevel;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::Path;

/// Default execution mode when the plan names none
pub const DEFAULT_EXECUTION_MODE: &str = "suggestion";

/// Proposed change plan
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub plan_id: Option<String>,
    pub intent_id: Option<String>,
    #[serde(deserialize_with = "lenient_risk_level")]
    pub risk_level: RiskLevel,
    pub execution_mode: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub actions: Vec<PlanAction>,
    #[serde(deserialize_with = "null_as_default")]
    pub approval: PlanApproval,
    #[serde(deserialize_with = "null_as_default")]
    pub authorization: PlanAuthorization,
}

/// One step of a plan
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanAction {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub action_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub requires_privilege_escalation: bool,
}

impl PlanAction {
    /// Create action of the given type
    #[inline]
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            requires_privilege_escalation: false,
        }
    }

    /// Mark action as needing elevated rights
    #[inline]
    #[must_use]
    pub fn escalated(mut self) -> Self {
        self.requires_privilege_escalation = true;
        self
    }
}

/// Approval block embedded in a plan
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanApproval {
    pub status: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub dual_approved: bool,
}

/// Authorization block embedded in a plan
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanAuthorization {
    #[serde(deserialize_with = "null_as_default")]
    pub password_required: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub password_scope: Vec<String>,
    pub password_hash: Option<String>,
    pub password_hash_env: Option<String>,
    pub password_ttl_seconds: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub reason_codes: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub role_requirements: Map<String, Value>,
}

impl Plan {
    /// Execution mode with the default applied
    #[must_use]
    pub fn execution_mode(&self) -> &str {
        self.execution_mode
            .as_deref()
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
            .unwrap_or(DEFAULT_EXECUTION_MODE)
    }

    /// Parse plan from a JSON value
    ///
    /// # Errors
    /// Returns [`WorkflowError::DocumentParse`] if the value is not an object
    /// or a field has the wrong type
    pub fn from_value(value: Value, path: &Path) -> WorkflowResult<Self> {
        if !value.is_object() {
            return Err(WorkflowError::document_parse(
                "plan",
                path,
                "expected a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| WorkflowError::document_parse("plan", path, e.to_string()))
    }

    /// Load plan from a JSON file
    ///
    /// # Errors
    /// - [`WorkflowError::DocumentRead`] if the file cannot be read
    /// - [`WorkflowError::DocumentParse`] if it is not a valid plan
    pub fn from_path(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let value = read_json("plan", path)?;
        Self::from_value(value, path)
    }
}

/// Operator-supplied role policy
///
/// Accepts either `{"role_requirements": {...}}` or the bare mapping. Keys
/// are kept raw here; normalisation happens in
/// [`resolve_role_requirements`](crate::policy::resolve_role_requirements).
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    pub role_requirements: Map<String, Value>,
}

impl RolePolicy {
    /// Parse policy from a JSON value
    ///
    /// # Errors
    /// Returns [`WorkflowError::DocumentParse`] if the value (or its
    /// `role_requirements` member) is not an object
    pub fn from_value(value: Value, path: &Path) -> WorkflowResult<Self> {
        let Value::Object(mut root) = value else {
            return Err(WorkflowError::document_parse(
                "role policy",
                path,
                "expected a JSON object",
            ));
        };
        let role_requirements = match root.remove("role_requirements") {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(WorkflowError::document_parse(
                    "role policy",
                    path,
                    "role_requirements must be an object",
                ))
            }
            None => root,
        };
        Ok(Self { role_requirements })
    }

    /// Load policy from a JSON file
    ///
    /// # Errors
    /// - [`WorkflowError::DocumentRead`] if the file cannot be read
    /// - [`WorkflowError::DocumentParse`] if it is not a valid policy
    pub fn from_path(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let value = read_json("role policy", path)?;
        Self::from_value(value, path)
    }
}

fn read_json(kind: &'static str, path: &Path) -> WorkflowResult<Value> {
    let raw = std::fs::read_to_string(path).map_err(|source| WorkflowError::DocumentRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| WorkflowError::document_parse(kind, path, e.to_string()))
}

/// Explicit `null` reads as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_risk_level<'de, D>(deserializer: D) -> Result<RiskLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .map(RiskLevel::parse_lenient)
        .unwrap_or_default())
}
