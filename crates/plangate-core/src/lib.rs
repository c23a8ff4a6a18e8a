//! plangate core - approval workflow for agent-proposed change plans
//!
//! Tracks one plan from proposal to archival and decides, at every step,
//! whether the step may happen:
//! - role requirements merged from an operator policy and the plan
//! - mandatory approval for high-risk or privilege-escalating plans
//! - time-boxed step-up password checks before `approve` / `execute`
//! - a hash-chained audit trail of every attempt, blocked or not
//!
//! # Example
//!
//! ```rust,ignore
//! use plangate_core::prelude::*;
//!
//! let engine = WorkflowEngine::new(FileStore::new(StorePaths::default()));
//! let plan = Plan::from_path("plan.json")?;
//! engine.init(&plan, None, &InitRequest::new("alice"))?;
//!
//! let outcome = engine.transition(MutatingAction::Submit, &TransitionRequest::new("alice"))?;
//! assert!(!outcome.is_blocked());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod plan;
pub mod policy;
pub mod report;
pub mod state_machine;
pub mod step_up;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use audit::{verify_chain, AuditEntry, AuditTrail, ChainError, EventType, WorkflowEvent};
pub use clock::{Clock, SystemClock};
pub use config::{
    parse_password_hash, parse_password_scope, parse_password_ttl, InitRequest, Password,
    StepUpOverrides, StorePaths, TransitionRequest,
};
pub use error::{HashError, StoreError, WorkflowError, WorkflowResult};
pub use guard::GuardFailure;
pub use plan::{Plan, PlanAction, RolePolicy};
pub use policy::ApprovalFlags;
pub use report::{AuthorizationSummary, Decision, Outcome};
pub use state_machine::WorkflowEngine;
pub use step_up::{EnvSecrets, SecretSource, VerifierHash};
pub use store::{FileStore, MemoryStore, WorkflowStore};
pub use types::{
    ApprovalRecord, ApprovalStatus, AuthorizationRecord, Command, MutatingAction, RiskLevel,
    RoleRequirements, WorkflowId, WorkflowState, WorkflowStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a workflow
    pub use crate::{
        Command, Decision, FileStore, InitRequest, MemoryStore, MutatingAction, Outcome, Plan,
        RolePolicy, StepUpOverrides, StorePaths, TransitionRequest, WorkflowEngine,
        WorkflowError, WorkflowStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
