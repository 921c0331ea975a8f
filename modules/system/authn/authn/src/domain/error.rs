//! Domain errors for authentication.

use authn_sdk::AuthNError;
use warden_security::{RequestType, WorkerError};

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("no identity provider registered for {0:?} requests")]
    ProviderNotFound(RequestType),

    #[error("credentials rejected: {0}")]
    Rejected(String),

    #[error("identity provider '{provider:?}' failed: {source}")]
    ProviderFailed {
        provider: RequestType,
        source: AuthNError,
    },

    #[error("identity augmentor '{augmentor}' failed: {source}")]
    AugmentationFailed { augmentor: String, source: AuthNError },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<WorkerError> for DomainError {
    fn from(e: WorkerError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl DomainError {
    /// Whether the failure is a plain credential rejection.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Rejected(_) => true,
            Self::ProviderFailed { source, .. } | Self::AugmentationFailed { source, .. } => {
                source.is_unauthorized()
            }
            Self::ProviderNotFound(_) | Self::Internal(_) => false,
        }
    }
}

impl From<DomainError> for AuthNError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::ProviderNotFound(request_type) => Self::NoProviderAvailable(request_type),
            DomainError::Rejected(msg) => Self::Unauthorized(msg),
            // Collaborator errors keep their message so error mappers see it unchanged.
            DomainError::ProviderFailed { source, .. }
            | DomainError::AugmentationFailed { source, .. } => source,
            DomainError::Internal(msg) => Self::Internal(msg),
        }
    }
}
