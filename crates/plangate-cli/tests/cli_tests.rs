//! Black-box tests of the `plangate` binary: output and exit codes.

use plangate_core::config::DEFAULT_PASSWORD_HASH_ENV;
use plangate_test_utils::{sha256_hex, TEST_PASSWORD};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    fn state_file(&self) -> PathBuf {
        self.dir.path().join("state/workflow.json")
    }

    fn audit_file(&self) -> PathBuf {
        self.dir.path().join("state/audit.jsonl")
    }

    fn plangate(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_plangate"));
        cmd.env_remove("PLANGATE_PASSWORD")
            .env_remove(DEFAULT_PASSWORD_HASH_ENV)
            .env_remove("RUST_LOG")
            .arg("--state-file")
            .arg(self.state_file())
            .arg("--audit-file")
            .arg(self.audit_file())
            .args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.plangate(args).output().unwrap()
    }

    fn run_json(&self, args: &[&str]) -> (i32, Value) {
        let mut all = args.to_vec();
        all.push("--json");
        let output = self.run(&all);
        let payload = serde_json::from_slice(&output.stdout).unwrap_or(Value::Null);
        (output.status.code().unwrap(), payload)
    }
}

#[test]
fn high_risk_flow_exit_codes() {
    let ws = Workspace::new();
    let plan = ws.file(
        "plan.json",
        &json!({"plan_id": "p-1", "risk_level": "high", "actions": [{"type": "deploy"}]}),
    );
    let plan = plan.to_str().unwrap();

    let (code, payload) = ws.run_json(&["--action", "init", "--plan", plan, "--actor", "planner"]);
    assert_eq!(code, 0);
    assert_eq!(payload["mode"], "interactive-approval");
    assert_eq!(payload["state"]["approval_required"], true);

    let (code, _) = ws.run_json(&["--action", "submit", "--actor", "planner"]);
    assert_eq!(code, 0);

    let (code, payload) = ws.run_json(&["--action", "execute", "--actor", "operator"]);
    assert_eq!(code, 2);
    assert_eq!(payload["decision"], "blocked");
    assert_eq!(payload["reason"], "approval required before execute");

    for action in ["approve", "execute", "verify", "archive"] {
        let (code, payload) = ws.run_json(&["--action", action, "--actor", "lead"]);
        assert_eq!(code, 0, "{action} should pass");
        assert_eq!(payload["decision"], "ok");
    }

    let (code, payload) = ws.run_json(&["--action", "status"]);
    assert_eq!(code, 0);
    assert_eq!(payload["state"]["status"], "archived");
    assert_eq!(payload["state"]["history"].as_array().unwrap().len(), 7);
    assert_eq!(payload["history_intact"], true);

    let log = fs::read_to_string(ws.audit_file()).unwrap();
    assert_eq!(log.lines().count(), 7);
}

#[test]
fn password_from_environment() {
    let ws = Workspace::new();
    let plan = ws.file(
        "plan.json",
        &json!({
            "risk_level": "low",
            "authorization": {"password_required": true, "password_scope": ["execute"]}
        }),
    );
    let plan = plan.to_str().unwrap();
    let digest = sha256_hex(TEST_PASSWORD);

    let (code, _) = ws.run_json(&["--action", "init", "--plan", plan, "--actor", "planner"]);
    assert_eq!(code, 0);
    let (code, _) = ws.run_json(&["--action", "submit", "--actor", "planner"]);
    assert_eq!(code, 0);

    let (code, payload) = ws.run_json(&["--action", "execute", "--actor", "operator"]);
    assert_eq!(code, 2);
    assert_eq!(
        payload["reason"],
        "password authorization required but verifier hash is not configured"
    );

    let output = ws
        .plangate(&["--action", "execute", "--actor", "operator", "--json"])
        .env(DEFAULT_PASSWORD_HASH_ENV, &digest)
        .env("PLANGATE_PASSWORD", TEST_PASSWORD)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains(TEST_PASSWORD));
    assert!(!stdout.contains(&digest));
}

#[test]
fn text_output_by_default() {
    let ws = Workspace::new();
    let plan = ws.file("plan.json", &json!({"risk_level": "low"}));

    let output = ws.run(&[
        "--action",
        "init",
        "--plan",
        plan.to_str().unwrap(),
        "--actor",
        "planner",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("decision:  ok"));
    assert!(stdout.contains("status:    draft"));
}

#[test]
fn hard_errors_exit_one() {
    let ws = Workspace::new();

    let output = ws.run(&["--action", "submit", "--actor", "planner"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("run init first"));

    let output = ws.run(&["--action", "launch", "--actor", "planner"]);
    assert_eq!(output.status.code(), Some(1));

    let output = ws.run(&["--action", "init", "--actor", "planner"]);
    assert_eq!(output.status.code(), Some(1));

    let missing = ws.dir.path().join("missing.json");
    let output = ws.run(&[
        "--action",
        "init",
        "--plan",
        missing.to_str().unwrap(),
        "--actor",
        "planner",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load plan"));

    let output = ws.plangate(&[]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn init_twice_needs_force() {
    let ws = Workspace::new();
    let plan = ws.file("plan.json", &json!({"risk_level": "medium"}));
    let plan = plan.to_str().unwrap();
    let init = ["--action", "init", "--plan", plan, "--actor", "planner"];

    assert_eq!(ws.run(&init).status.code(), Some(0));
    assert_eq!(ws.run(&init).status.code(), Some(1));

    let mut forced = init.to_vec();
    forced.push("--force");
    assert_eq!(ws.run(&forced).status.code(), Some(0));
}

#[test]
fn password_hash_is_refused_after_init() {
    let ws = Workspace::new();
    let plan = ws.file(
        "plan.json",
        &json!({
            "risk_level": "low",
            "authorization": {
                "password_required": true,
                "password_scope": ["execute"],
                "password_hash": sha256_hex(TEST_PASSWORD)
            }
        }),
    );
    let plan = plan.to_str().unwrap();
    assert_eq!(
        ws.run(&["--action", "init", "--plan", plan, "--actor", "planner"]).status.code(),
        Some(0)
    );
    assert_eq!(
        ws.run(&["--action", "submit", "--actor", "planner"]).status.code(),
        Some(0)
    );

    let chosen = sha256_hex("mallory-knows-this");
    let output = ws.run(&[
        "--action",
        "execute",
        "--actor",
        "mallory",
        "--password",
        "mallory-knows-this",
        "--password-hash",
        chosen.as_str(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("can only be set at init"));

    let (code, payload) = ws.run_json(&["--action", "status"]);
    assert_eq!(code, 0);
    assert_eq!(payload["state"]["status"], "submitted");
    assert_eq!(payload["authorization"]["password_verified"], false);
}
