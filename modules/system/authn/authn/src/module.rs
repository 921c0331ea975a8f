//! Assembly of the authentication stack from configuration.

use std::sync::Arc;

use authn_sdk::{HttpAuthenticationMechanism, IdentityAugmentor, IdentityProvider};
use tracing::info;

use crate::augmentor::RolesMappingAugmentor;
use crate::config::AuthnConfig;
use crate::domain::{ProviderManager, ProviderManagerBuilder};
use crate::mechanism::{
    BasicAuthenticationMechanism, BearerAuthenticationMechanism, FormAuthenticationMechanism,
    MtlsAuthenticationMechanism,
};
use crate::provider::{StaticIdentityProvider, StaticIdentityStore};

/// Mechanisms and provider manager built from [`AuthnConfig`].
///
/// Application-specific providers, augmentors and mechanisms are added with
/// the `with_*` methods before the stack is handed to the gateway.
pub struct AuthnStack {
    pub providers: Arc<ProviderManager>,
    pub mechanisms: Vec<Arc<dyn HttpAuthenticationMechanism>>,
    /// The form mechanism, when enabled; it also serves the login endpoint.
    pub form: Option<Arc<FormAuthenticationMechanism>>,
}

/// Builder collecting extra providers and augmentors before the manager is sealed.
#[must_use]
pub struct AuthnStackBuilder {
    providers: ProviderManagerBuilder,
    augmentors: Vec<Arc<dyn IdentityAugmentor>>,
    mechanisms: Vec<Arc<dyn HttpAuthenticationMechanism>>,
    form: Option<Arc<FormAuthenticationMechanism>>,
}

impl AuthnStack {
    /// Start from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a user, token or mechanism setting is invalid.
    #[tracing::instrument(skip_all)]
    pub fn from_config(cfg: &AuthnConfig) -> anyhow::Result<AuthnStackBuilder> {
        let store = Arc::new(StaticIdentityStore::from_config(&cfg.users, &cfg.tokens)?);
        info!(
            users = cfg.users.len(),
            tokens = cfg.tokens.len(),
            "Initializing static identity provider"
        );

        let mut mechanisms: Vec<Arc<dyn HttpAuthenticationMechanism>> = Vec::new();
        if cfg.basic.enabled {
            mechanisms.push(Arc::new(BasicAuthenticationMechanism::new(&cfg.basic)?));
        }
        if cfg.bearer.enabled {
            mechanisms.push(Arc::new(BearerAuthenticationMechanism::new(&cfg.bearer)));
        }
        if cfg.mtls.enabled {
            mechanisms.push(Arc::new(MtlsAuthenticationMechanism::new(&cfg.mtls)));
        }
        let form = if cfg.form.enabled {
            let form = Arc::new(FormAuthenticationMechanism::new(&cfg.form)?);
            mechanisms.push(form.clone());
            Some(form)
        } else {
            None
        };

        let mut augmentors: Vec<Arc<dyn IdentityAugmentor>> = Vec::new();
        if !cfg.roles_mapping.is_empty() {
            augmentors.push(Arc::new(RolesMappingAugmentor::new(cfg.roles_mapping.clone())));
        }

        Ok(AuthnStackBuilder {
            providers: ProviderManager::builder().providers(StaticIdentityProvider::for_store(&store)),
            augmentors,
            mechanisms,
            form,
        })
    }
}

impl AuthnStackBuilder {
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers = self.providers.provider(provider);
        self
    }

    /// Augmentors run after the configured roles mapping, in the order added.
    pub fn with_augmentor(mut self, augmentor: Arc<dyn IdentityAugmentor>) -> Self {
        self.augmentors.push(augmentor);
        self
    }

    pub fn with_mechanism(mut self, mechanism: Arc<dyn HttpAuthenticationMechanism>) -> Self {
        self.mechanisms.push(mechanism);
        self
    }

    pub fn build(self) -> AuthnStack {
        let providers = self
            .augmentors
            .into_iter()
            .fold(self.providers, ProviderManagerBuilder::augmentor)
            .build();
        let names: Vec<&str> = self.mechanisms.iter().map(|m| m.name()).collect();
        info!(mechanisms = ?names, "Authentication stack ready");
        AuthnStack {
            providers: Arc::new(providers),
            mechanisms: self.mechanisms,
            form: self.form,
        }
    }
}
