//! # Errors
//!
//! Error taxonomy for stack construction.
//!
//! Every failure falls into one of three classes:
//! - configuration errors: invalid or colliding settings, fatal, never retried
//! - provisioning errors: failures reported by the provisioning engine,
//!   propagated unchanged
//! - invariant violations: programming errors such as linking resources
//!   that were never declared
//!
//! There is no partial success: a stack is either fully described or an
//! error is returned before anything is emitted.

use thiserror::Error;

/// Error type for stack construction and application
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Invalid stack configuration: {0}")]
    Configuration(String),
    #[error("Resource `{logical_id}` is declared more than once")]
    DuplicateResource { logical_id: String },
    #[error("Secret `{name}` already exists in this scope")]
    DuplicateSecret { name: String },
    #[error("Image repository `{name}` could not be resolved")]
    UnresolvedRepository { name: String },
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Dependency cycle detected involving {0}")]
    DependencyCycle(String),
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] anyhow::Error),
}

/// Coarse classification of a [`StackError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Provisioning,
    InvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Provisioning => "provisioning",
            ErrorKind::InvariantViolation => "invariant_violation",
        }
    }
}

impl StackError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StackError::Configuration(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        StackError::Precondition(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StackError::Configuration(_)
            | StackError::DuplicateResource { .. }
            | StackError::DuplicateSecret { .. }
            | StackError::UnresolvedRepository { .. } => ErrorKind::Configuration,
            StackError::Provisioning(_) => ErrorKind::Provisioning,
            StackError::Precondition(_) | StackError::DependencyCycle(_) => {
                ErrorKind::InvariantViolation
            }
        }
    }

    /// Retry policy for live infrastructure belongs to the provisioning
    /// engine, so nothing raised here is retried by the stack builder.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get remediation guidance for this error
    pub fn remediation(&self) -> String {
        match self {
            StackError::Configuration(msg) => format!("Fix the stack settings: {msg}"),
            StackError::DuplicateResource { logical_id } => format!(
                "Rename one of the resources called `{logical_id}`; names are derived from the scope name and must be unique"
            ),
            StackError::DuplicateSecret { name } => format!(
                "Secret `{name}` is owned by another resource; choose a different scope name or remove the existing secret"
            ),
            StackError::UnresolvedRepository { name } => format!(
                "Create image repository `{name}` and push the application image before provisioning"
            ),
            StackError::Precondition(_) | StackError::DependencyCycle(_) => {
                "This is a bug in stack assembly; please report it".to_string()
            }
            StackError::Provisioning(e) => {
                format!("The provisioning engine reported a failure: {e}")
            }
        }
    }
}
