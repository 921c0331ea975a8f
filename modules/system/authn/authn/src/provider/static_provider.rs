//! Static identity provider backed by configured users and tokens.
//!
//! Intended for development, tests and small deployments:
//! - `username_password`: configured user whose password matches
//! - `trusted_principal`: configured user with that name
//! - `certificate`: certificate common name, with the roles of the user of the same name
//! - `token`: configured token mapping

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use authn_sdk::{AuthNError, IdentityProvider, RequestInfo};
use secrecy::{ExposeSecret, SecretString};
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity, StringPermission};

use crate::config::{TokenMapping, UserConfig};

struct StaticUser {
    password: SecretString,
    identity: SecurityIdentity,
}

/// Identities resolved from configuration once at startup.
pub struct StaticIdentityStore {
    users: HashMap<String, StaticUser>,
    tokens: Vec<(SecretString, SecurityIdentity)>,
}

impl StaticIdentityStore {
    /// Build the store from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a user or token lists a malformed permission.
    pub fn from_config(users: &[UserConfig], tokens: &[TokenMapping]) -> anyhow::Result<Self> {
        let users = users
            .iter()
            .map(|u| {
                let identity = build_identity(&u.username, &u.roles, &u.permissions)
                    .with_context(|| format!("invalid permissions for user '{}'", u.username))?;
                Ok((
                    u.username.clone(),
                    StaticUser {
                        password: u.password.clone(),
                        identity,
                    },
                ))
            })
            .collect::<anyhow::Result<HashMap<_, _>>>()?;

        let tokens = tokens
            .iter()
            .map(|m| {
                let identity = build_identity(&m.principal, &m.roles, &m.permissions)
                    .with_context(|| format!("invalid permissions for token of '{}'", m.principal))?;
                Ok((m.token.clone(), identity))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { users, tokens })
    }

    fn user(&self, name: &str) -> Option<&StaticUser> {
        self.users.get(name)
    }

    fn authenticate(&self, request: &AuthenticationRequest) -> Result<Option<SecurityIdentity>, AuthNError> {
        match request {
            AuthenticationRequest::UsernamePassword(up) => {
                let Some(user) = self.user(&up.username) else {
                    return Ok(None);
                };
                if user.password.expose_secret() != up.password.expose_secret() {
                    return Err(AuthNError::Unauthorized("invalid username or password".to_owned()));
                }
                Ok(Some(user.identity.clone()))
            }
            AuthenticationRequest::TrustedPrincipal(trusted) => {
                Ok(self.user(&trusted.principal).map(|u| u.identity.clone()))
            }
            AuthenticationRequest::Certificate(cert) => {
                let name = cert.common_name().unwrap_or(&cert.subject);
                let identity = self.user(name).map_or_else(
                    || SecurityIdentity::builder(name).build(),
                    |u| u.identity.clone(),
                );
                Ok(Some(identity))
            }
            AuthenticationRequest::Token(token) => {
                let presented = token.token.expose_secret();
                if presented.is_empty() {
                    return Ok(None);
                }
                Ok(self
                    .tokens
                    .iter()
                    .find(|(t, _)| t.expose_secret() == presented)
                    .map(|(_, identity)| identity.clone()))
            }
        }
    }
}

fn build_identity(
    principal: &str,
    roles: &[String],
    permissions: &[String],
) -> Result<SecurityIdentity, warden_security::PermissionParseError> {
    let mut builder = SecurityIdentity::builder(principal).roles(roles.iter().cloned());
    for expression in permissions {
        builder = builder.permission(StringPermission::parse(expression)?);
    }
    Ok(builder.build())
}

/// One provider per credential type, all sharing the same store.
pub struct StaticIdentityProvider {
    store: Arc<StaticIdentityStore>,
    request_type: RequestType,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new(store: Arc<StaticIdentityStore>, request_type: RequestType) -> Self {
        Self { store, request_type }
    }

    /// Providers for every credential type the store can answer.
    ///
    /// Tokens are only served when at least one token is configured.
    #[must_use]
    pub fn for_store(store: &Arc<StaticIdentityStore>) -> Vec<Arc<dyn IdentityProvider>> {
        let mut types = vec![
            RequestType::UsernamePassword,
            RequestType::TrustedPrincipal,
            RequestType::Certificate,
        ];
        if !store.tokens.is_empty() {
            types.push(RequestType::Token);
        }
        types
            .into_iter()
            .map(|t| Arc::new(Self::new(Arc::clone(store), t)) as Arc<dyn IdentityProvider>)
            .collect()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    fn request_type(&self) -> RequestType {
        self.request_type
    }

    async fn authenticate(
        &self,
        request: &AuthenticationRequest,
        _context: &RequestInfo,
    ) -> Result<Option<SecurityIdentity>, AuthNError> {
        if request.request_type() != self.request_type {
            return Ok(None);
        }
        self.store.authenticate(request)
    }
}
