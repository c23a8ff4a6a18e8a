//! Argument parsing and dispatch for the `plangate` binary

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use plangate_core::config::{DEFAULT_AUDIT_FILE, DEFAULT_STATE_FILE};
use plangate_core::{
    parse_password_hash, parse_password_scope, parse_password_ttl, Command as WorkflowCommand,
    FileStore, InitRequest, Outcome, Password, Plan, RolePolicy, StepUpOverrides, StorePaths,
    TransitionRequest, WorkflowEngine, WorkflowError,
};
use std::path::PathBuf;

/// Environment variable that may carry the step-up password
pub(crate) const PASSWORD_ENV: &str = "PLANGATE_PASSWORD";

pub(crate) fn command() -> Command {
    Command::new("plangate")
        .version(plangate_core::VERSION)
        .about("Role- and password-gated approval workflow for change plans")
        .arg(
            Arg::new("action")
                .long("action")
                .required(true)
                .value_name("ACTION")
                .help("init, submit, approve, reject, execute, verify, archive or status"),
        )
        .arg(
            Arg::new("plan")
                .long("plan")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Plan JSON document (required for init)"),
        )
        .arg(
            Arg::new("actor")
                .long("actor")
                .value_name("NAME")
                .help("Who is acting (required except for status)"),
        )
        .arg(
            Arg::new("actor-role")
                .long("actor-role")
                .value_name("ROLE")
                .help("Role the actor acts under"),
        )
        .arg(
            Arg::new("comment")
                .long("comment")
                .help("Free-text note recorded with the event"),
        )
        .arg(
            Arg::new("role-policy")
                .long("role-policy")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Role policy JSON document, merged under the plan's own entries"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Let init replace an existing workflow"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .env(PASSWORD_ENV)
                .hide_env_values(true)
                .help("Step-up password for approve / execute"),
        )
        .arg(
            Arg::new("password-hash")
                .long("password-hash")
                .value_name("SHA256_HEX")
                .help("Verifier digest: hex SHA-256 of the password (init only)"),
        )
        .arg(
            Arg::new("password-hash-env")
                .long("password-hash-env")
                .value_name("NAME")
                .help("Environment variable holding the verifier digest"),
        )
        .arg(
            Arg::new("password-required")
                .long("password-required")
                .action(ArgAction::SetTrue)
                .help("Require a step-up password (init only)"),
        )
        .arg(
            Arg::new("password-scope")
                .long("password-scope")
                .value_name("ACTIONS")
                .help("Comma separated actions gated by the password: approve, execute"),
        )
        .arg(
            Arg::new("password-ttl-seconds")
                .long("password-ttl-seconds")
                .value_name("SECONDS")
                .value_parser(value_parser!(i64))
                .allow_negative_numbers(true)
                .help("How long a verified password stays valid"),
        )
        .arg(
            Arg::new("state-file")
                .long("state-file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_STATE_FILE)
                .help("Workflow state document"),
        )
        .arg(
            Arg::new("audit-file")
                .long("audit-file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_AUDIT_FILE)
                .help("Append-only audit log (JSON Lines)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
}

/// Validated invocation
#[derive(Debug)]
pub(crate) struct InvocationOptions {
    pub(crate) command: WorkflowCommand,
    pub(crate) plan: Option<PathBuf>,
    pub(crate) role_policy: Option<PathBuf>,
    pub(crate) actor: String,
    pub(crate) actor_role: Option<String>,
    pub(crate) comment: Option<String>,
    pub(crate) force: bool,
    pub(crate) password: Option<Password>,
    pub(crate) step_up: StepUpOverrides,
    pub(crate) paths: StorePaths,
    pub(crate) json: bool,
}

impl InvocationOptions {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Result<Self, WorkflowError> {
        let command: WorkflowCommand = matches
            .get_one::<String>("action")
            .ok_or(WorkflowError::MissingArgument("action"))?
            .parse()?;

        let mut step_up = StepUpOverrides::default();
        if matches.get_flag("password-required") {
            step_up = step_up.require_password();
        }
        if let Some(raw) = matches.get_one::<String>("password-scope") {
            step_up = step_up.with_scope(parse_password_scope(raw)?);
        }
        if let Some(raw) = matches.get_one::<String>("password-hash") {
            if command != WorkflowCommand::Init {
                return Err(WorkflowError::InitOnlyOption("--password-hash"));
            }
            step_up = step_up.with_hash(parse_password_hash(raw)?);
        }
        if let Some(name) = text(matches, "password-hash-env") {
            step_up = step_up.with_hash_env(name);
        }
        if let Some(ttl) = matches.get_one::<i64>("password-ttl-seconds") {
            step_up = step_up.with_ttl_seconds(parse_password_ttl(*ttl)?);
        }

        let plan = matches.get_one::<PathBuf>("plan").cloned();
        if command == WorkflowCommand::Init && plan.is_none() {
            return Err(WorkflowError::MissingArgument("plan"));
        }
        let actor = text(matches, "actor").unwrap_or_default();
        if command.requires_actor() && actor.is_empty() {
            return Err(WorkflowError::MissingArgument("actor"));
        }

        let mut paths = StorePaths::default();
        if let Some(path) = matches.get_one::<PathBuf>("state-file") {
            paths.state_file.clone_from(path);
        }
        if let Some(path) = matches.get_one::<PathBuf>("audit-file") {
            paths.audit_file.clone_from(path);
        }

        Ok(Self {
            command,
            plan,
            role_policy: matches.get_one::<PathBuf>("role-policy").cloned(),
            actor,
            actor_role: text(matches, "actor-role"),
            comment: text(matches, "comment"),
            force: matches.get_flag("force"),
            password: matches
                .get_one::<String>("password")
                .map(|p| Password::new(p.as_str())),
            step_up,
            paths,
            json: matches.get_flag("json"),
        })
    }

    fn init_request(&self) -> InitRequest {
        InitRequest {
            actor: self.actor.clone(),
            actor_role: self.actor_role.clone(),
            comment: self.comment.clone(),
            force: self.force,
            step_up: self.step_up.clone(),
        }
    }

    fn transition_request(&self) -> TransitionRequest {
        TransitionRequest {
            actor: self.actor.clone(),
            actor_role: self.actor_role.clone(),
            comment: self.comment.clone(),
            password: self.password.clone(),
            step_up: self.step_up.clone(),
        }
    }
}

/// Run one invocation against the file store
pub(crate) fn execute(options: &InvocationOptions) -> Result<Outcome> {
    let plan = options
        .plan
        .as_ref()
        .filter(|_| options.command == WorkflowCommand::Init)
        .map(Plan::from_path)
        .transpose()
        .context("failed to load plan")?;
    let policy = options
        .role_policy
        .as_ref()
        .filter(|_| options.command == WorkflowCommand::Init)
        .map(RolePolicy::from_path)
        .transpose()
        .context("failed to load role policy")?;

    let engine = WorkflowEngine::new(FileStore::new(options.paths.clone()));
    engine
        .run(
            options.command,
            plan.as_ref(),
            policy.as_ref(),
            &options.init_request(),
            &options.transition_request(),
        )
        .with_context(|| format!("{} failed", options.command))
}

/// Trimmed, non-empty string argument
fn text(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plangate_core::MutatingAction;

    fn parse(args: &[&str]) -> Result<InvocationOptions, WorkflowError> {
        let matches = command()
            .try_get_matches_from(std::iter::once("plangate").chain(args.iter().copied()))
            .unwrap();
        InvocationOptions::from_matches(&matches)
    }

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn action_is_required() {
        assert!(command().try_get_matches_from(["plangate"]).is_err());
    }

    #[test]
    fn transition_options() {
        let options = parse(&[
            "--action",
            "Approve",
            "--actor",
            " lead ",
            "--actor-role",
            "reviewer",
            "--password",
            "hunter2",
            "--state-file",
            "/tmp/wf.json",
        ])
        .unwrap();
        assert_eq!(options.command, WorkflowCommand::Transition(MutatingAction::Approve));
        assert_eq!(options.actor, "lead");
        assert_eq!(options.actor_role.as_deref(), Some("reviewer"));
        assert_eq!(options.password.as_ref().map(Password::expose), Some("hunter2"));
        assert_eq!(options.paths.state_file, PathBuf::from("/tmp/wf.json"));
        assert_eq!(options.paths.audit_file, PathBuf::from(DEFAULT_AUDIT_FILE));
        assert!(!format!("{options:?}").contains("hunter2"));
    }

    #[test]
    fn step_up_flags() {
        let options = parse(&[
            "--action",
            "init",
            "--plan",
            "plan.json",
            "--actor",
            "planner",
            "--password-required",
            "--password-scope",
            "approve,execute",
            "--password-hash-env",
            "GATE_SHA",
            "--password-ttl-seconds",
            "90",
        ])
        .unwrap();
        assert!(options.step_up.password_required);
        assert_eq!(
            options.step_up.password_scope,
            Some(vec![MutatingAction::Approve, MutatingAction::Execute])
        );
        assert_eq!(options.step_up.password_hash_env.as_deref(), Some("GATE_SHA"));
        assert_eq!(options.step_up.password_ttl_seconds, Some(90));
    }

    #[test]
    fn configuration_errors() {
        assert!(matches!(
            parse(&["--action", "deploy", "--actor", "a"]),
            Err(WorkflowError::UnknownAction(_))
        ));
        assert!(matches!(
            parse(&["--action", "init", "--actor", "a"]),
            Err(WorkflowError::MissingArgument("plan"))
        ));
        assert!(matches!(
            parse(&["--action", "submit"]),
            Err(WorkflowError::MissingArgument("actor"))
        ));
        assert!(matches!(
            parse(&["--action", "submit", "--actor", "a", "--password-ttl-seconds", "-5"]),
            Err(WorkflowError::InvalidPasswordTtl(-5))
        ));
        assert!(matches!(
            parse(&["--action", "submit", "--actor", "a", "--password-scope", "verify"]),
            Err(WorkflowError::InvalidPasswordScope(_))
        ));
        assert!(matches!(
            parse(&["--action", "init", "--plan", "p.json", "--actor", "a", "--password-hash", "xyz"]),
            Err(WorkflowError::InvalidPasswordHash(_))
        ));
        let digest = "ab".repeat(32);
        assert!(matches!(
            parse(&["--action", "execute", "--actor", "a", "--password-hash", digest.as_str()]),
            Err(WorkflowError::InitOnlyOption("--password-hash"))
        ));
    }

    #[test]
    fn status_needs_no_actor() {
        let options = parse(&["--action", "status", "--json"]).unwrap();
        assert_eq!(options.command, WorkflowCommand::Status);
        assert!(options.actor.is_empty());
        assert!(options.json);
    }
}
