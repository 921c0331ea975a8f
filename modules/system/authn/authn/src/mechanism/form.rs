//! Form login with a signed credential cookie.
//!
//! `POST <post_location>` with the username and password fields authenticates
//! through the provider manager and issues `cookie_name=user:hex(hmac_sha256(key, user))`.
//! Later requests carrying a valid cookie authenticate as a trusted principal.

use anyhow::Context;
use async_trait::async_trait;
use authn_sdk::{AuthNError, ChallengeData, HttpAuthenticationMechanism, IdentityProviderManager, RequestInfo};
use cookie::Cookie;
use hmac::{Hmac, Mac};
use http::{HeaderValue, Method};
use secrecy::ExposeSecret;
use sha2::Sha256;
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity};

use crate::config::FormConfig;

pub const FORM: &str = "form";

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a successful form login.
#[derive(Debug)]
pub struct FormLogin {
    pub identity: SecurityIdentity,
    /// `Set-Cookie` value carrying the signed credential.
    pub cookie: HeaderValue,
    /// Where to send the browser next.
    pub redirect: ChallengeData,
}

pub struct FormAuthenticationMechanism {
    priority: i32,
    post_location: String,
    username_parameter: String,
    password_parameter: String,
    cookie_name: String,
    /// Keyed with the signing key; cloned per signature.
    mac: HmacSha256,
    login_page: HeaderValue,
    error_page: HeaderValue,
    landing_page: HeaderValue,
}

impl FormAuthenticationMechanism {
    /// # Errors
    ///
    /// Returns an error if the signing key is empty or a page location is not a valid header value.
    pub fn new(cfg: &FormConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !cfg.signing_key.expose_secret().is_empty(),
            "form authentication requires a signing key"
        );
        Ok(Self {
            priority: cfg.priority,
            post_location: cfg.post_location.clone(),
            username_parameter: cfg.username_parameter.clone(),
            password_parameter: cfg.password_parameter.clone(),
            cookie_name: cfg.cookie_name.clone(),
            mac: <HmacSha256 as Mac>::new_from_slice(cfg.signing_key.expose_secret().as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid form signing key: {e}"))?,
            login_page: HeaderValue::try_from(cfg.login_page.as_str()).context("invalid login page")?,
            error_page: HeaderValue::try_from(cfg.error_page.as_str()).context("invalid error page")?,
            landing_page: HeaderValue::try_from(cfg.landing_page.as_str())
                .context("invalid landing page")?,
        })
    }

    /// Whether the request is a login form submission.
    #[must_use]
    pub fn is_login_request(&self, request: &RequestInfo) -> bool {
        request.method() == Method::POST && request.path() == self.post_location
    }

    /// Authenticate a login form submission and issue the credential cookie.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if a field is missing or the credentials are rejected
    /// - `Internal` if the principal cannot be carried in a cookie
    /// - any other provider manager error, unchanged
    pub async fn login(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<FormLogin, AuthNError> {
        let (Some(username), Some(password)) = (
            request.form_field(&self.username_parameter),
            request.form_field(&self.password_parameter),
        ) else {
            return Err(AuthNError::Unauthorized("missing login form fields".to_owned()));
        };
        let identity = providers
            .authenticate(AuthenticationRequest::username_password(username, password), request)
            .await?;
        let cookie = Cookie::build((
            self.cookie_name.as_str(),
            self.credential(identity.principal_name()),
        ))
        .path("/")
        .http_only(true)
        .build();
        let cookie = HeaderValue::try_from(cookie.to_string())
            .map_err(|e| AuthNError::Internal(format!("cannot issue credential cookie: {e}")))?;
        Ok(FormLogin {
            identity,
            cookie,
            redirect: ChallengeData::redirect(self.landing_page.clone()),
        })
    }

    /// Redirect sent after a failed login.
    #[must_use]
    pub fn login_failure(&self) -> ChallengeData {
        ChallengeData::redirect(self.error_page.clone())
    }

    fn keyed(&self, principal: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(principal.as_bytes());
        mac
    }

    fn signature(&self, principal: &str) -> String {
        hex::encode(self.keyed(principal).finalize().into_bytes())
    }

    fn credential(&self, principal: &str) -> String {
        format!("{principal}:{}", self.signature(principal))
    }

    fn verify<'a>(&self, cookie: &'a str) -> Option<&'a str> {
        let (principal, signature) = cookie.rsplit_once(':')?;
        let signature = hex::decode(signature).ok()?;
        (!principal.is_empty() && self.keyed(principal).verify_slice(&signature).is_ok()).then_some(principal)
    }
}

#[async_trait]
impl HttpAuthenticationMechanism for FormAuthenticationMechanism {
    fn name(&self) -> &str {
        FORM
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn credential_types(&self) -> &[RequestType] {
        &[RequestType::UsernamePassword, RequestType::TrustedPrincipal]
    }

    async fn authenticate(
        &self,
        request: &RequestInfo,
        providers: &dyn IdentityProviderManager,
    ) -> Result<Option<SecurityIdentity>, AuthNError> {
        let Some(cookie) = request.cookie(&self.cookie_name) else {
            return Ok(None);
        };
        let principal = self
            .verify(cookie)
            .ok_or_else(|| AuthNError::Unauthorized("invalid credential cookie".to_owned()))?;
        providers
            .authenticate(AuthenticationRequest::trusted(principal), request)
            .await
            .map(Some)
    }

    fn challenge(&self, _request: &RequestInfo) -> ChallengeData {
        ChallengeData::redirect(self.login_page.clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use http::{HeaderMap, StatusCode, header};

    use super::*;
    use crate::config::UserConfig;
    use crate::domain::ProviderManager;
    use crate::provider::{StaticIdentityProvider, StaticIdentityStore};

    fn providers() -> ProviderManager {
        let users = vec![UserConfig {
            username: "admin".to_owned(),
            password: "admin".to_owned().into(),
            roles: vec!["admin".to_owned()],
            permissions: vec![],
        }];
        let store = Arc::new(StaticIdentityStore::from_config(&users, &[]).unwrap());
        ProviderManager::builder()
            .providers(StaticIdentityProvider::for_store(&store))
            .build()
    }

    fn mechanism() -> FormAuthenticationMechanism {
        FormAuthenticationMechanism::new(&FormConfig {
            enabled: true,
            signing_key: "secret".to_owned().into(),
            ..FormConfig::default()
        })
        .unwrap()
    }

    fn login_request(user: &str, password: &str) -> RequestInfo {
        RequestInfo::new(Method::POST, "/j_security_check").with_form_fields(vec![
            ("j_username".to_owned(), user.to_owned()),
            ("j_password".to_owned(), password.to_owned()),
        ])
    }

    fn cookie_request(cookie: &str) -> RequestInfo {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::try_from(cookie).unwrap());
        RequestInfo::new(Method::GET, "/secured").with_headers(headers)
    }

    #[test]
    fn empty_signing_key_is_rejected() {
        assert!(FormAuthenticationMechanism::new(&FormConfig::default()).is_err());
    }

    #[tokio::test]
    async fn login_issues_cookie_that_authenticates_later_requests() {
        let mechanism = mechanism();
        let providers = providers();
        let login_request = login_request("admin", "admin");
        assert!(mechanism.is_login_request(&login_request));

        let login = mechanism.login(&login_request, &providers).await.unwrap();
        assert_eq!(login.identity.principal_name(), "admin");
        assert_eq!(login.redirect.headers[header::LOCATION], "/index.html");

        let set_cookie = Cookie::parse(login.cookie.to_str().unwrap()).unwrap();
        assert_eq!(set_cookie.name(), "warden-credential");
        assert_eq!(set_cookie.path(), Some("/"));
        assert_eq!(set_cookie.http_only(), Some(true));
        let pair = set_cookie.stripped().to_string();
        assert!(pair.starts_with("warden-credential=admin:"));

        let identity = mechanism
            .authenticate(&cookie_request(&pair), &providers)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.principal_name(), "admin");
        assert!(identity.has_role("admin"));
    }

    #[tokio::test]
    async fn quoted_cookie_value_authenticates() {
        let mechanism = mechanism();
        let credential = mechanism.credential("admin");
        let identity = mechanism
            .authenticate(
                &cookie_request(&format!("warden-credential=\"{credential}\"")),
                &providers(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.principal_name(), "admin");
    }

    #[tokio::test]
    async fn unkeyed_digest_is_not_a_valid_signature() {
        use sha2::Digest;

        let forged = hex::encode(Sha256::digest("secret:admin"));
        let err = mechanism()
            .authenticate(&cookie_request(&format!("warden-credential=admin:{forged}")), &providers())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn tampered_cookie_is_rejected() {
        let err = mechanism()
            .authenticate(&cookie_request("warden-credential=admin:deadbeef"), &providers())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn wrong_password_fails_login() {
        let mechanism = mechanism();
        let err = mechanism
            .login(&login_request("admin", "nope"), &providers())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(mechanism.login_failure().headers[header::LOCATION], "/error.html");
    }

    #[test]
    fn challenge_redirects_to_login_page_without_caching() {
        let challenge = mechanism().challenge(&RequestInfo::new(Method::GET, "/secured"));
        assert_eq!(challenge.status, StatusCode::FOUND);
        assert_eq!(challenge.headers[header::LOCATION], "/login.html");
        assert_eq!(challenge.headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(challenge.headers[header::PRAGMA], "no-cache");
    }
}
