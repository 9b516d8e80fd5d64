//! Error types for Berth

use thiserror::Error;

/// Main error type for Berth
#[derive(Error, Debug)]
pub enum Error {
    /// A required identifier or parameter was missing or malformed.
    /// Raised before any provider I/O and never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A tag scan returned zero results where exactly one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// A remote provider call failed, after retries where applicable
    #[error("Provider error ({label}): {message}")]
    Provider { label: String, message: String },

    /// An invariant over provider state does not hold
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A retry or poll budget was exhausted
    #[error("Timeout ({label}): {message}")]
    Timeout { label: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ValidationError
pub fn validation(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

/// NotFoundError
pub fn not_found(msg: impl Into<String>) -> Error {
    Error::NotFound(msg.into())
}

/// ProviderError, wrapped with the label of the failing call
pub fn provider(label: impl Into<String>, err: impl std::fmt::Display) -> Error {
    Error::Provider {
        label: label.into(),
        message: err.to_string(),
    }
}

/// ConflictError
pub fn conflict(msg: impl Into<String>) -> Error {
    Error::Conflict(msg.into())
}

impl Error {
    /// Whether the retrying executor must give up immediately on this error.
    ///
    /// Validation failures are deterministic; re-issuing the call cannot
    /// change the outcome. Everything else is assumed transient against an
    /// eventually-consistent provider.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = provider("ec2.create_vpc", "throttled");
        assert!(err.to_string().contains("ec2.create_vpc"));
        assert!(err.to_string().contains("throttled"));

        let err = not_found("no subnet tagged pid=demo");
        assert!(err.to_string().contains("no subnet"));
    }

    #[test]
    fn test_non_retryable_classification() {
        assert!(validation("missing pid").is_non_retryable());
        assert!(!provider("x", "y").is_non_retryable());
        assert!(!conflict("both slots occupied").is_non_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
