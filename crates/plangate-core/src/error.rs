//! Error types for plangate core
//!
//! Only hard failures live here: unreadable documents, invalid options,
//! missing state and persistence problems. A transition refused by a guard is
//! not an error; it is reported as a blocked [`Outcome`](crate::Outcome).

use std::path::PathBuf;

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Input document could not be read
    #[error("io error reading {path}: {source}")]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input document is not valid JSON or has the wrong shape
    #[error("invalid {kind} document {path}: {message}")]
    DocumentParse {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    /// A required argument was not supplied
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Action name is not one of the workflow commands
    #[error("unknown action: '{0}'")]
    UnknownAction(String),

    /// Password hash is not a 64 character hex digest
    #[error("invalid password hash: {0}")]
    InvalidPasswordHash(#[from] HashError),

    /// Password scope names an action that cannot be step-up protected
    #[error("invalid password scope '{0}': expected approve or execute")]
    InvalidPasswordScope(String),

    /// Password TTL must be a positive, bounded number of seconds
    #[error("password ttl must be between 1 and {max} seconds, got {0}", max = crate::config::MAX_PASSWORD_TTL_SECONDS)]
    InvalidPasswordTtl(i64),

    /// Option that is frozen into the workflow was given to a later action
    #[error("{0} can only be set at init")]
    InitOnlyOption(&'static str),

    /// A non-init action was requested before the workflow exists
    #[error("workflow state not found at {0}; run init first")]
    StateMissing(PathBuf),

    /// `init` would overwrite an existing workflow
    #[error("workflow state already exists at {0}; pass force to overwrite")]
    StateExists(PathBuf),

    /// Persistence failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Create document parse error
    pub fn document_parse(
        kind: &'static str,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::DocumentParse {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if error comes from invalid user input rather than the environment
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Store(StoreError::Io { .. }))
    }
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on the state document or audit log
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored state document is corrupt
    #[error("corrupt state document {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Document changed on disk since it was loaded
    #[error("revision conflict: expected revision {expected}, found {actual}")]
    RevisionConflict { expected: u64, actual: u64 },

    /// Serialization of a record failed
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Verifier hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// Wrong number of hex characters
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),

    /// Non-hex characters present
    #[error("not a hex string")]
    InvalidHex,
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
