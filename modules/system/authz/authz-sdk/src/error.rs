//! Error types for the authorization stage.

use authn_sdk::AuthNError;
use thiserror::Error;
use warden_security::WorkerError;

/// Outcome of a failed authorization step.
///
/// `Unauthenticated` and `Forbidden` are decisions; the remaining variants
/// are failures of the code that was asked to decide.
#[derive(Debug, Error)]
pub enum AuthZError {
    /// No identity, or only the anonymous one, where an authenticated one is required.
    #[error("authentication required")]
    Unauthenticated,

    /// The identity is valid but lacks the required rights.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// Resolving the identity on demand failed.
    #[error(transparent)]
    Authentication(#[from] AuthNError),

    /// A permission checker or custom policy failed.
    #[error("permission checker '{checker}' failed: {source}")]
    Checker {
        checker: String,
        source: CheckerError,
    },

    /// A security declaration cannot be evaluated.
    #[error("invalid security declaration: {0}")]
    Misconfigured(String),
}

impl AuthZError {
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }
}

/// Failures raised by permission checkers or by their dispatch.
#[derive(Debug, Error)]
pub enum CheckerError {
    /// The checker needs a blocking worker and none is configured.
    #[error("checker requires a blocking worker but blocking checkers are disabled")]
    BlockingUnavailable,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Arbitrary failure reported by the checker itself.
    #[error("{0}")]
    Failed(String),
}
