//! Error types for the compaction map.

use thiserror::Error;

/// Result type for compaction map operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or querying compaction maps.
///
/// Lookup misses are never errors; they are reported as `None`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Operation not permitted in the current state of the map.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A malformed identifier or argument was supplied.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::invalid_state("generation 3 is finalized");
        assert_eq!(err.to_string(), "invalid state: generation 3 is finalized");

        let err = CoreError::invalid_argument("bad segment id");
        assert_eq!(err.to_string(), "invalid argument: bad segment id");
    }
}
