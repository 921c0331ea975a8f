//! HTTP authentication mechanism contract.
//!
//! A mechanism knows how to find credentials in a request, hand them to the
//! [`IdentityProviderManager`] and describe the challenge to send back when
//! the caller must authenticate.

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use warden_security::{RequestType, SecurityIdentity};

use crate::error::AuthNError;
use crate::provider::IdentityProviderManager;
use crate::request::RequestInfo;

/// Named strategy for extracting and validating request credentials.
///
/// Mechanisms are registered once at startup and shared across requests:
///
/// ```ignore
/// let identity = basic.authenticate(&request, &*providers).await?;
/// if identity.is_none() {
///     let challenge = basic.challenge(&request);
/// }
/// ```
#[async_trait]
pub trait HttpAuthenticationMechanism: Send + Sync {
    /// Unique mechanism name, as used by endpoint declarations and policy pins.
    fn name(&self) -> &str;

    /// Higher priority mechanisms are tried first and produce the challenge.
    fn priority(&self) -> i32 {
        1000
    }

    /// Credential request types this mechanism produces.
    fn credential_types(&self) -> &[RequestType];

    /// Authenticate the request.
    ///
    /// Returns `Ok(None)` when the request carries no credentials for this
    /// mechanism.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if credentials are present but rejected
    /// - any error returned by the provider manager, unchanged
    async fn authenticate(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<Option<SecurityIdentity>, AuthNError>;

    /// Challenge sent when the caller must authenticate with this mechanism.
    fn challenge(&self, request: &RequestInfo) -> ChallengeData;
}

/// Status and headers of an authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeData {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ChallengeData {
    /// Plain 401 without headers.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
        }
    }

    /// 302 to `location` with caching disabled.
    #[must_use]
    pub fn redirect(location: HeaderValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, location);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        Self {
            status: StatusCode::FOUND,
            headers,
        }
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }
}
