//! Identity provider contracts.
//!
//! Providers register for one credential type and self-select on
//! [`AuthenticationRequest::request_type`]. The manager routes each request to
//! the providers of its type and runs the augmentor chain on the result.

use async_trait::async_trait;
use warden_security::{AuthenticationRequest, ExecutionAffinity, RequestType, SecurityIdentity};

use crate::error::AuthNError;
use crate::request::RequestInfo;

/// Pluggable authenticator for one credential type.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Credential type this provider handles.
    fn request_type(&self) -> RequestType;

    /// Providers of the same type are consulted in descending priority.
    fn priority(&self) -> i32 {
        0
    }

    /// Execution context the provider must run on.
    fn affinity(&self) -> ExecutionAffinity {
        ExecutionAffinity::NonBlocking
    }

    /// Authenticate the credentials.
    ///
    /// Returns `Ok(None)` when this provider does not recognise the caller,
    /// so the next provider of the same type can try.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the credentials are recognised but invalid
    /// - `Internal` for unexpected failures
    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        context: &RequestInfo,
    ) -> Result<Option<SecurityIdentity>, AuthNError>;
}

/// Entry point mechanisms use to turn credentials into an augmented identity.
#[async_trait]
pub trait IdentityProviderManager: Send + Sync {
    /// Authenticate `request` and run every registered augmentor on the result.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if no provider accepts the credentials
    /// - `NoProviderAvailable` if no provider is registered for the credential type
    /// - `Internal` if a provider or augmentor fails
    async fn authenticate(
        &self,
        request: AuthenticationRequest,
        context: &RequestInfo,
    ) -> Result<SecurityIdentity, AuthNError>;

    /// Run the augmentor chain on an identity that no provider produced,
    /// such as the anonymous identity of a request without credentials.
    ///
    /// # Errors
    ///
    /// Returns the first augmentor failure.
    async fn augment(&self, identity: SecurityIdentity, context: &RequestInfo) -> Result<SecurityIdentity, AuthNError>;
}
