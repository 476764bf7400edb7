use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The engine's error taxonomy.
///
/// Every fallible operation in `core`, `database`, and `engine` returns
/// one of these variants. Each carries enough context to render a
/// useful message without the caller needing to inspect the source.
///
/// # Examples
///
/// ```rust
/// use orchestrator_core::error::EngineError;
///
/// let err = EngineError::not_found("task", "a1b2c3d4");
/// assert!(err.is_not_found());
/// assert!(!err.is_retryable());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The workspace directory is missing, unreadable, or has no
    /// `.task-orchestrator/` tree and none was requested to be created.
    #[error("workspace error: {0}")]
    WorkspaceError(String),

    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// An update's `expected_version` no longer matches the stored
    /// version; the caller observed stale state.
    #[error("conflict updating {kind} {id}: expected version {expected}, found {actual}")]
    Conflict {
        kind: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Adding this dependency edge would create a cycle.
    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    /// The task cannot be deleted because other tasks depend on it.
    #[error("task {0} has dependents and cannot be deleted")]
    HasDependents(String),

    /// The workspace lock could not be acquired before its timeout.
    #[error("workspace lock busy: {0}")]
    Busy(String),

    /// On-disk state (store file, channel log, lock file) is present
    /// but unreadable or structurally invalid.
    #[error("corrupt state: {0}")]
    Corrupt(String),

    /// The store's schema version does not match what this build
    /// expects and no migration path applies.
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// The enforcement gate rejected the call.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A pre-hook exited non-zero, vetoing the operation.
    #[error("hook '{hook}' blocked operation: {reason}")]
    HookBlocked { hook: String, reason: String },

    /// A hook did not complete within its configured timeout.
    #[error("hook timed out: {0}")]
    HookTimeout(String),

    /// A hook could not be spawned or otherwise failed outside its
    /// exit-code contract.
    #[error("hook error: {0}")]
    HookError(String),

    /// Template rendering failed: missing required variable, malformed
    /// template source, or a handlebars error.
    #[error("template error: {0}")]
    TemplateError(String),

    /// A success criterion's expression evaluated to false, or a
    /// manual criterion was not explicitly confirmed.
    #[error("criteria unmet: {0}")]
    CriteriaUnmet(String),

    /// A caller-supplied value failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn conflict(kind: impl Into<String>, id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::Conflict {
            kind: kind.into(),
            id: id.into(),
            expected,
            actual,
        }
    }

    pub fn cycle(path: impl Into<String>) -> Self {
        Self::Cycle(path.into())
    }

    pub fn schema_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::InvalidInput(format!("field '{field}': {reason}"))
    }

    pub fn hook_blocked(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HookBlocked {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error indicates the requested entity does not
    /// exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Whether this error is a caller-input problem rather than a
    /// system fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_))
    }

    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// Whether retrying the same call, unmodified, after a short delay
    /// has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_))
    }
}
