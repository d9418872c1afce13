//! # Core Error Types
//!
//! Contract violations surface here as values. Stale handles are not errors
//! (`resolve` returns `None`), and a panicking command on the core thread is
//! not recoverable: it halts the run loop and is reported as
//! [`CommandError::CommandPanicked`].

use thiserror::Error;

use crate::handle::InstanceId;
use crate::object::CoreObjectId;

/// Errors reported by [`AsyncOp`](crate::AsyncOp).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncOpError {
    /// Blocking was requested on an op created without blocking support.
    #[error("async op was created without sync data, it cannot be blocked on")]
    NoSyncData,

    /// The result was read before the op completed.
    #[error("async op has not completed yet")]
    NotCompleted,

    /// The stored result is not of the requested type.
    #[error("async op result type mismatch: expected {expected}")]
    TypeMismatch {
        /// Name of the type the caller asked for.
        expected: &'static str,
    },

    /// `complete` was called on an op that already holds a result.
    #[error("async op was already completed")]
    AlreadyCompleted,

    /// The command bound to this op was dropped without running.
    #[error("async op was abandoned, its command never ran")]
    Abandoned,
}

/// Result type for AsyncOp operations.
pub type AsyncOpResult<T> = Result<T, AsyncOpError>;

/// Errors reported by the command queue and the core thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The core thread is no longer accepting commands.
    #[error("core thread has halted")]
    CoreThreadHalted,

    /// A command body panicked on the core thread.
    #[error("command #{command} panicked on the core thread: {message}")]
    CommandPanicked {
        /// Sequence number of the failing command.
        command: u64,
        /// Panic payload rendered as text.
        message: String,
    },

    /// The OS refused to start the core thread.
    #[error("failed to spawn core thread: {0}")]
    SpawnFailed(String),

    /// The object's counterpart construction was never queued.
    #[error("core object {0} is not initialized")]
    NotInitialized(CoreObjectId),
}

/// Result type for command submission.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors reported by the handle registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The id is not registered and not redirected.
    #[error("unknown instance id: {0}")]
    UnknownId(InstanceId),

    /// The remap would make an id redirect to itself.
    #[error("remapping {old} -> {new} would create a cycle")]
    RemapCycle {
        /// Id being redirected.
        old: InstanceId,
        /// Requested target.
        new: InstanceId,
    },

    /// The id is already registered or redirected.
    #[error("instance id already in use: {0}")]
    IdInUse(InstanceId),
}

/// Result type for handle registry operations.
pub type HandleResult<T> = Result<T, HandleError>;

/// Errors reported while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML text could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// The config parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Umbrella error for callers that mix several core services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// See [`AsyncOpError`].
    #[error(transparent)]
    AsyncOp(#[from] AsyncOpError),

    /// See [`CommandError`].
    #[error(transparent)]
    Command(#[from] CommandError),

    /// See [`HandleError`].
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for mixed core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AsyncOpError::TypeMismatch { expected: "u32" };
        assert_eq!(err.to_string(), "async op result type mismatch: expected u32");

        let err = CommandError::CommandPanicked {
            command: 7,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "command #7 panicked on the core thread: boom");
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: CoreError = HandleError::UnknownId(InstanceId::new(3)).into();
        assert!(matches!(err, CoreError::Handle(HandleError::UnknownId(_))));
        assert_eq!(err.to_string(), "unknown instance id: #3");
    }
}
