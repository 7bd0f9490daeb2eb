//! Error types for the Spyglass operator

use thiserror::Error;

/// Main error type for Spyglass operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Certificate generation, signing, or decoding error
    #[error("pki error: {0}")]
    Pki(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Aggregate convergence failure: some members failed to converge and
    /// the pass as a whole must be retried
    #[error("convergence error: {0}")]
    Convergence(String),

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a pki error with the given message
    pub fn pki(msg: impl Into<String>) -> Self {
        Self::Pki(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a convergence error with the given message
    pub fn convergence(msg: impl Into<String>) -> Self {
        Self::Convergence(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = Error::pki("authority secret observability-server-ca-certs not found");
        assert!(err.to_string().contains("pki error"));
        assert!(err.to_string().contains("observability-server-ca-certs"));

        let err = Error::convergence("2 member(s) failed to converge");
        assert!(err.to_string().contains("convergence error"));
        assert!(err.to_string().contains("2 member(s)"));
    }

    #[test]
    fn helpers_accept_both_str_and_string() {
        let ns = "member-1";
        let err = Error::serialization(format!("bundle for {ns} is not valid JSON"));
        assert!(err.to_string().contains("member-1"));

        let err = Error::config("hub namespace must not be empty");
        assert!(matches!(err, Error::Config(_)));
    }

    /// Errors are categorized so the pass either retries wholesale or not:
    /// store errors and aggregate failures requeue, configuration errors
    /// need a spec change.
    #[test]
    fn error_categorization_for_retry_policy() {
        fn retries(err: &Error) -> bool {
            !matches!(err, Error::Config(_))
        }

        assert!(retries(&Error::convergence("partial failure")));
        assert!(retries(&Error::pki("corrupt key")));
        assert!(!retries(&Error::config("bad flag")));
    }
}
