//! HTTP Basic authentication.

use anyhow::Context;
use async_trait::async_trait;
use authn_sdk::{AuthNError, ChallengeData, HttpAuthenticationMechanism, IdentityProviderManager, RequestInfo};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderValue, header};
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity};

use super::authorization_credentials;
use crate::config::BasicConfig;

pub const BASIC: &str = "basic";

pub struct BasicAuthenticationMechanism {
    priority: i32,
    challenge: HeaderValue,
}

impl BasicAuthenticationMechanism {
    /// # Errors
    ///
    /// Returns an error if the realm cannot be carried in a header.
    pub fn new(cfg: &BasicConfig) -> anyhow::Result<Self> {
        let challenge = HeaderValue::try_from(format!("Basic realm=\"{}\"", cfg.realm))
            .context("invalid basic realm")?;
        Ok(Self {
            priority: cfg.priority,
            challenge,
        })
    }
}

fn decode(credentials: &str) -> Result<(String, String), AuthNError> {
    let malformed = || AuthNError::Unauthorized("malformed basic credentials".to_owned());
    let bytes = STANDARD.decode(credentials).map_err(|_| malformed())?;
    let plain = String::from_utf8(bytes).map_err(|_| malformed())?;
    let (user, password) = plain.split_once(':').ok_or_else(malformed)?;
    Ok((user.to_owned(), password.to_owned()))
}

#[async_trait]
impl HttpAuthenticationMechanism for BasicAuthenticationMechanism {
    fn name(&self) -> &str {
        BASIC
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn credential_types(&self) -> &[RequestType] {
        &[RequestType::UsernamePassword]
    }

    async fn authenticate(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<Option<SecurityIdentity>, AuthNError> {
        let Some(credentials) = authorization_credentials(request, "Basic") else {
            return Ok(None);
        };
        let (user, password) = decode(credentials)?;
        providers
            .authenticate(AuthenticationRequest::username_password(user, password), request)
            .await
            .map(Some)
    }

    fn challenge(&self, _request: &RequestInfo) -> ChallengeData {
        ChallengeData::unauthorized().with_header(header::WWW_AUTHENTICATE, self.challenge.clone())
    }
}
