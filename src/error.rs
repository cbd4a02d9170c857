//! `JBoot` Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Top-level error type for `JBoot`
#[derive(Error, Debug)]
pub enum JBootError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task factory configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("multiple definition of attribute '{key}'")]
    MultipleDefinition { key: String },

    #[error("invalid value \"{value}\" for attribute '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("definition of '{field}' is missing")]
    MissingField { field: String },

    #[error("unknown attribute '{key}'")]
    UnknownKey { key: String },

    #[error("failed to parse configuration: {0}")]
    ParseError(String),
}

/// Execution context errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("cannot add object \"{id}\" to context: an object with the same id already exists")]
    DuplicateObject { id: String },
}

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("failed to create log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type returned by a procedure's `run`
pub type ProcedureError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure captured from a procedure execution
///
/// Shared by every handle to the failed task.
#[derive(Error, Debug, Clone)]
pub enum TaskFailure {
    /// The procedure returned an error
    #[error("{0}")]
    Error(Arc<dyn StdError + Send + Sync + 'static>),

    /// The procedure panicked; holds the panic message
    #[error("procedure panicked: {0}")]
    Panic(String),
}

impl TaskFailure {
    /// The error returned by the procedure, if it did not panic
    #[must_use]
    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            TaskFailure::Error(err) => Some(err.as_ref()),
            TaskFailure::Panic(_) => None,
        }
    }

    /// Whether the procedure panicked
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskFailure::Panic(_))
    }

    /// Turn the failure back into an error result
    pub fn rethrow(&self) -> std::result::Result<(), TaskFailure> {
        Err(self.clone())
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskFailure::Panic(message)
    }
}

impl From<ProcedureError> for TaskFailure {
    fn from(err: ProcedureError) -> Self {
        TaskFailure::Error(Arc::from(err))
    }
}

/// Result type alias for `JBoot` operations
pub type Result<T> = std::result::Result<T, JBootError>;

/// Result type alias for Config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for Context operations
pub type ContextResult<T> = std::result::Result<T, ContextError>;
