//! # Engine Error Types

use tandem_core::{AsyncOpError, CommandError, ConfigError, CoreError, HandleError};
use thiserror::Error;

/// Errors surfaced by [`Engine`](crate::Engine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// See [`CommandError`].
    #[error(transparent)]
    Command(#[from] CommandError),

    /// See [`AsyncOpError`].
    #[error(transparent)]
    AsyncOp(#[from] AsyncOpError),

    /// See [`HandleError`].
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AsyncOp(e) => Self::AsyncOp(e),
            CoreError::Command(e) => Self::Command(e),
            CoreError::Handle(e) => Self::Handle(e),
            CoreError::Config(e) => Self::Config(e),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_flattens() {
        let err: EngineError = CoreError::from(CommandError::CoreThreadHalted).into();
        assert_eq!(err, EngineError::Command(CommandError::CoreThreadHalted));
        assert_eq!(err.to_string(), "core thread has halted");
    }
}
