//! Mutual TLS authentication.
//!
//! TLS is terminated by the transport; the verified subject DN arrives either
//! attached to the request or in the configured header.

use async_trait::async_trait;
use authn_sdk::{AuthNError, ChallengeData, HttpAuthenticationMechanism, IdentityProviderManager, RequestInfo};
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity};

use crate::config::MtlsConfig;

pub const MTLS: &str = "mtls";

pub struct MtlsAuthenticationMechanism {
    priority: i32,
    certificate_header: String,
}

impl MtlsAuthenticationMechanism {
    #[must_use]
    pub fn new(cfg: &MtlsConfig) -> Self {
        Self {
            priority: cfg.priority,
            certificate_header: cfg.certificate_header.to_ascii_lowercase(),
        }
    }

    fn subject<'a>(&self, request: &'a RequestInfo) -> Option<&'a str> {
        request
            .peer_certificate()
            .or_else(|| request.header(&self.certificate_header))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl HttpAuthenticationMechanism for MtlsAuthenticationMechanism {
    fn name(&self) -> &str {
        MTLS
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn credential_types(&self) -> &[RequestType] {
        &[RequestType::Certificate]
    }

    async fn authenticate(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<Option<SecurityIdentity>, AuthNError> {
        let Some(subject) = self.subject(request) else {
            return Ok(None);
        };
        providers
            .authenticate(AuthenticationRequest::certificate(subject), request)
            .await
            .map(Some)
    }

    fn challenge(&self, _request: &RequestInfo) -> ChallengeData {
        ChallengeData::unauthorized()
    }
}
