//! Testing utilities for plangate workspace
//!
//! Shared test helpers, fixtures, and doubles.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use plangate_core::{Clock, MemoryStore, Plan, RolePolicy, SecretSource, VerifierHash, WorkflowEngine};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Password whose digest the fixtures carry
pub const TEST_PASSWORD: &str = "let-me-ship";

/// Hex SHA-256 of a password, computed independently of the core crate
pub fn sha256_hex(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn test_password_hash() -> VerifierHash {
    sha256_hex(TEST_PASSWORD).parse().unwrap()
}

pub fn plan_from_json(value: Value) -> Plan {
    Plan::from_value(value, Path::new("fixture-plan.json")).unwrap()
}

pub fn policy_from_json(value: Value) -> RolePolicy {
    RolePolicy::from_value(value, Path::new("fixture-policy.json")).unwrap()
}

/// High risk, one deploy action, no step-up
pub fn high_risk_plan() -> Plan {
    plan_from_json(json!({
        "plan_id": "plan-high-001",
        "intent_id": "intent-001",
        "risk_level": "high",
        "actions": [{"type": "deploy"}]
    }))
}

/// Low risk suggestion, nothing gated
pub fn low_risk_plan() -> Plan {
    plan_from_json(json!({
        "plan_id": "plan-low-001",
        "risk_level": "low",
        "actions": [{"type": "analysis_only"}]
    }))
}

/// Low risk plan with a privilege-escalating action
pub fn escalated_plan() -> Plan {
    plan_from_json(json!({
        "plan_id": "plan-esc-001",
        "risk_level": "low",
        "actions": [
            {"type": "read_config"},
            {"type": "restart_service", "requires_privilege_escalation": true}
        ]
    }))
}

/// Low risk plan requiring a step-up password for `scope`
pub fn password_plan(scope: &[&str]) -> Plan {
    plan_from_json(json!({
        "plan_id": "plan-pw-001",
        "risk_level": "low",
        "actions": [{"type": "write_file"}],
        "authorization": {
            "password_required": true,
            "password_scope": scope,
            "password_hash": sha256_hex(TEST_PASSWORD),
        }
    }))
}

/// Fixed starting point for manual clocks
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

/// Clock moved by hand; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(epoch())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fixed set of named secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretSource for StaticSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

pub type TestEngine = WorkflowEngine<MemoryStore, ManualClock, StaticSecrets>;

/// In-memory engine with a manual clock and no secrets
pub fn memory_engine(clock: &ManualClock) -> TestEngine {
    memory_engine_with_secrets(clock, StaticSecrets::new())
}

pub fn memory_engine_with_secrets(clock: &ManualClock, secrets: StaticSecrets) -> TestEngine {
    WorkflowEngine::new(MemoryStore::new())
        .with_clock(clock.clone())
        .with_secrets(secrets)
}
