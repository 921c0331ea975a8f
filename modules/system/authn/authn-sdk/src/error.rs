//! Error types for the authentication stage.

use thiserror::Error;
use warden_security::RequestType;

/// Errors that can occur while authenticating a request.
#[derive(Debug, Clone, Error)]
pub enum AuthNError {
    /// The credentials are invalid, expired, or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No identity provider is registered for the credential type.
    #[error("no identity provider available for {0:?} requests")]
    NoProviderAvailable(RequestType),

    /// The provider is not available yet.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An unexpected failure inside a provider, augmentor, or mechanism.
    /// The message is surfaced to the error-mapping collaborator unchanged.
    #[error("{0}")]
    Internal(String),
}

impl AuthNError {
    /// Whether the failure means "no valid identity" (401) rather than an
    /// unhandled authenticator failure.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
