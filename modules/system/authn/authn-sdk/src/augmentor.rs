//! Post-authentication identity transforms.

use async_trait::async_trait;
use warden_security::SecurityIdentity;

use crate::error::AuthNError;
use crate::request::RequestInfo;

/// Augmentors run in registration order after a provider produced an identity.
///
/// Each one receives the previous result and returns a new identity, usually
/// derived with [`SecurityIdentity::builder_from`]. Any error fails the whole
/// authentication attempt.
#[async_trait]
pub trait IdentityAugmentor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Any error aborts authentication for the request.
    async fn augment(
        &self,
        identity: SecurityIdentity,
        context: &RequestInfo,
    ) -> Result<SecurityIdentity, AuthNError>;
}
