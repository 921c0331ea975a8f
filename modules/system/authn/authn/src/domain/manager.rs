//! Identity provider manager: provider routing plus the augmentor chain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use authn_sdk::{AuthNError, IdentityAugmentor, IdentityProvider, IdentityProviderManager, RequestInfo};
use warden_security::{AuthenticationRequest, RequestType, SecurityIdentity, execution};

use super::DomainError;

/// Routes credential requests to the providers registered for their type and
/// runs every augmentor, in registration order, on the resulting identity.
///
/// Read-only after [`ProviderManagerBuilder::build`]; shared across requests.
pub struct ProviderManager {
    providers: HashMap<RequestType, Vec<Arc<dyn IdentityProvider>>>,
    augmentors: Vec<Arc<dyn IdentityAugmentor>>,
}

impl ProviderManager {
    #[must_use]
    pub fn builder() -> ProviderManagerBuilder {
        ProviderManagerBuilder::default()
    }

    #[must_use]
    pub fn supports(&self, request_type: RequestType) -> bool {
        self.providers.contains_key(&request_type)
    }

    async fn authenticate_inner(
        &self,
        request: AuthenticationRequest,
        context: &RequestInfo,
    ) -> Result<SecurityIdentity, DomainError> {
        let request_type = request.request_type();
        let providers = self
            .providers
            .get(&request_type)
            .ok_or(DomainError::ProviderNotFound(request_type))?;

        let request = Arc::new(request);
        let context = Arc::new(context.clone());
        for provider in providers {
            let found = run_provider(provider, &request, &context)
                .await?
                .map_err(|source| DomainError::ProviderFailed {
                    provider: request_type,
                    source,
                })?;
            if let Some(identity) = found {
                return self.run_augmentors(identity, &context).await;
            }
        }
        Err(DomainError::Rejected(format!(
            "no identity provider accepted the {request_type:?} credentials"
        )))
    }

    async fn run_augmentors(
        &self,
        mut identity: SecurityIdentity,
        context: &RequestInfo,
    ) -> Result<SecurityIdentity, DomainError> {
        for augmentor in &self.augmentors {
            identity = augmentor.augment(identity, context).await.map_err(|source| {
                DomainError::AugmentationFailed {
                    augmentor: augmentor.name().to_owned(),
                    source,
                }
            })?;
        }
        Ok(identity)
    }
}

async fn run_provider(
    provider: &Arc<dyn IdentityProvider>,
    request: &Arc<AuthenticationRequest>,
    context: &Arc<RequestInfo>,
) -> Result<Result<Option<SecurityIdentity>, AuthNError>, DomainError> {
    let provider = Arc::clone(provider);
    let request = Arc::clone(request);
    let context = Arc::clone(context);
    let affinity = provider.affinity();
    let outcome = execution::run_on(affinity, move || async move {
        provider.authenticate(&request, &context).await
    })
    .await?;
    Ok(outcome)
}

fn log_and_convert(op: &str, e: DomainError) -> AuthNError {
    if e.is_rejection() {
        tracing::debug!(operation = op, error = %e, "credentials rejected");
    } else {
        tracing::error!(operation = op, error = ?e, "authentication failed");
    }
    e.into()
}

#[async_trait]
impl IdentityProviderManager for ProviderManager {
    async fn authenticate(
        &self,
        request: AuthenticationRequest,
        context: &RequestInfo,
    ) -> Result<SecurityIdentity, AuthNError> {
        self.authenticate_inner(request, context)
            .await
            .map_err(|e| log_and_convert("authenticate", e))
    }

    async fn augment(&self, identity: SecurityIdentity, context: &RequestInfo) -> Result<SecurityIdentity, AuthNError> {
        self.run_augmentors(identity, context)
            .await
            .map_err(|e| log_and_convert("augment", e))
    }
}

/// Builder for [`ProviderManager`].
#[derive(Default)]
#[must_use]
pub struct ProviderManagerBuilder {
    providers: Vec<Arc<dyn IdentityProvider>>,
    augmentors: Vec<Arc<dyn IdentityAugmentor>>,
}

impl ProviderManagerBuilder {
    pub fn provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn IdentityProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Augmentors run in the order they are added.
    pub fn augmentor(mut self, augmentor: Arc<dyn IdentityAugmentor>) -> Self {
        self.augmentors.push(augmentor);
        self
    }

    pub fn build(self) -> ProviderManager {
        let mut providers: HashMap<RequestType, Vec<Arc<dyn IdentityProvider>>> = HashMap::new();
        for provider in self.providers {
            providers.entry(provider.request_type()).or_default().push(provider);
        }
        for list in providers.values_mut() {
            // Stable sort keeps registration order among equal priorities.
            list.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        }
        ProviderManager {
            providers,
            augmentors: self.augmentors,
        }
    }
}
