//! Bearer token authentication.

use async_trait::async_trait;
use authn_sdk::{AuthNError, ChallengeData, HttpAuthenticationMechanism, IdentityProviderManager, RequestInfo};
use http::{HeaderValue, header};
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity};

use super::authorization_credentials;
use crate::config::BearerConfig;

pub const BEARER: &str = "bearer";

pub struct BearerAuthenticationMechanism {
    priority: i32,
}

impl BearerAuthenticationMechanism {
    #[must_use]
    pub fn new(cfg: &BearerConfig) -> Self {
        Self {
            priority: cfg.priority,
        }
    }
}

#[async_trait]
impl HttpAuthenticationMechanism for BearerAuthenticationMechanism {
    fn name(&self) -> &str {
        BEARER
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn credential_types(&self) -> &[RequestType] {
        &[RequestType::Token]
    }

    async fn authenticate(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<Option<SecurityIdentity>, AuthNError> {
        let Some(token) = authorization_credentials(request, "Bearer") else {
            return Ok(None);
        };
        if token.is_empty() {
            return Err(AuthNError::Unauthorized("empty bearer token".to_owned()));
        }
        providers
            .authenticate(AuthenticationRequest::token(token), request)
            .await
            .map(Some)
    }

    fn challenge(&self, _request: &RequestInfo) -> ChallengeData {
        ChallengeData::unauthorized()
            .with_header(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use http::{HeaderMap, Method};

    use super::*;
    use crate::config::TokenMapping;
    use crate::domain::ProviderManager;
    use crate::provider::{StaticIdentityProvider, StaticIdentityStore};

    fn providers() -> ProviderManager {
        let tokens = vec![TokenMapping {
            token: "t-1".to_owned().into(),
            principal: "svc".to_owned(),
            roles: vec![],
            permissions: vec![],
        }];
        let store = Arc::new(StaticIdentityStore::from_config(&[], &tokens).unwrap());
        ProviderManager::builder()
            .providers(StaticIdentityProvider::for_store(&store))
            .build()
    }

    fn request(authorization: &'static str) -> RequestInfo {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(authorization));
        RequestInfo::new(Method::GET, "/").with_headers(headers)
    }

    #[tokio::test]
    async fn known_token_authenticates() {
        let mechanism = BearerAuthenticationMechanism::new(&BearerConfig::default());
        let identity = mechanism
            .authenticate(&request("Bearer t-1"), &providers())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.principal_name(), "svc");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let mechanism = BearerAuthenticationMechanism::new(&BearerConfig::default());
        let err = mechanism
            .authenticate(&request("Bearer nope"), &providers())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn basic_header_is_ignored() {
        let mechanism = BearerAuthenticationMechanism::new(&BearerConfig::default());
        let result = mechanism
            .authenticate(&request("Basic YTpi"), &providers())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
