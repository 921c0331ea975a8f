//! HTTP security policy contract.

use async_trait::async_trait;
use authn_sdk::{AuthNError, RequestInfo};
use warden_security::SecurityIdentity;

use crate::check::CheckResult;
use crate::error::AuthZError;

/// Access to the request identity from a policy.
///
/// Implemented by the per-request pipeline: [`IdentitySource::identity`]
/// authenticates on first use and memoizes the result, while
/// [`IdentitySource::resolved`] never triggers authentication.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Identity of the request, authenticating on demand.
    ///
    /// # Errors
    ///
    /// Returns the authentication failure, which is the same on every call.
    async fn identity(&self) -> Result<SecurityIdentity, AuthNError>;

    /// Identity already resolved for the request, if any.
    fn resolved(&self) -> Option<SecurityIdentity>;
}

/// Named policy attached to request paths.
///
/// Applications register custom policies by name; configured permissions
/// refer to them through `policy: <name>`.
#[async_trait]
pub trait HttpSecurityPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Decide on the request.
    ///
    /// A policy that never calls [`IdentitySource::identity`] causes no
    /// authentication attempt.
    ///
    /// # Errors
    ///
    /// Any error fails the request; see [`AuthZError`] for the mapping.
    async fn check(
        &self,
        request: &RequestInfo,
        identity: &dyn IdentitySource,
    ) -> Result<CheckResult, AuthZError>;
}
