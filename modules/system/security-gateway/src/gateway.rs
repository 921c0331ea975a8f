//! Assembly of the security engine.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, bail};
use authn::mechanism::FormAuthenticationMechanism;
use authn::{AuthnStack, ProviderManager};
use authn_sdk::{HttpAuthenticationMechanism, IdentityAugmentor, IdentityProvider, RequestInfo};
use authz::{AuthorizationEvaluator, HttpPolicyEvaluator};
use authz_sdk::{HttpSecurityPolicy, PermissionChecker};
use tracing::info;

use crate::config::WardenConfig;
use crate::endpoint::{EndpointDeclaration, EndpointRegistry};
use crate::events::{EventBus, SecurityEventObserver};
use crate::failure::FailureHandler;
use crate::pipeline::RequestSecurity;

/// Read-only state shared by every request.
pub(crate) struct Engine {
    pub(crate) proactive: bool,
    pub(crate) default_mechanism: Option<String>,
    pub(crate) providers: Arc<ProviderManager>,
    /// Sorted by descending priority.
    pub(crate) mechanisms: Vec<Arc<dyn HttpAuthenticationMechanism>>,
    pub(crate) form: Option<Arc<FormAuthenticationMechanism>>,
    pub(crate) policies: HttpPolicyEvaluator,
    pub(crate) authorization: AuthorizationEvaluator,
    pub(crate) endpoints: EndpointRegistry,
    pub(crate) events: EventBus,
    pub(crate) failure_handler: Option<Arc<dyn FailureHandler>>,
}

/// Entry point of the security stack.
///
/// Cheap to clone; every clone shares the same engine.
#[derive(Clone)]
pub struct SecurityGateway {
    engine: Arc<Engine>,
}

impl SecurityGateway {
    #[must_use]
    pub fn builder(config: WardenConfig) -> SecurityGatewayBuilder {
        SecurityGatewayBuilder {
            config,
            policies: HashMap::new(),
            checkers: Vec::new(),
            providers: Vec::new(),
            augmentors: Vec::new(),
            mechanisms: Vec::new(),
            observers: Vec::new(),
            failure_handler: None,
            endpoints: Vec::new(),
        }
    }

    /// Start securing one request.
    #[must_use]
    pub fn secure(&self, request: RequestInfo) -> Arc<RequestSecurity> {
        Arc::new(RequestSecurity::new(Arc::clone(&self.engine), request))
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.engine.events
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.engine.endpoints
    }

    /// Registered mechanism names, by descending priority.
    pub fn mechanisms(&self) -> impl Iterator<Item = &str> {
        self.engine.mechanisms.iter().map(|m| m.name())
    }

    pub(crate) fn login_form(&self, request: &RequestInfo) -> Option<&Arc<FormAuthenticationMechanism>> {
        self.engine
            .form
            .as_ref()
            .filter(|form| form.is_login_request(request))
    }
}

/// Collects application components before the engine is sealed.
#[must_use]
pub struct SecurityGatewayBuilder {
    config: WardenConfig,
    policies: HashMap<String, Arc<dyn HttpSecurityPolicy>>,
    checkers: Vec<Arc<dyn PermissionChecker>>,
    providers: Vec<Arc<dyn IdentityProvider>>,
    augmentors: Vec<Arc<dyn IdentityAugmentor>>,
    mechanisms: Vec<Arc<dyn HttpAuthenticationMechanism>>,
    observers: Vec<Arc<dyn SecurityEventObserver>>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    endpoints: Vec<EndpointDeclaration>,
}

impl SecurityGatewayBuilder {
    /// Custom HTTP policy, referenced by name from configured permissions.
    pub fn policy(mut self, policy: Arc<dyn HttpSecurityPolicy>) -> Self {
        self.policies.insert(policy.name().to_owned(), policy);
        self
    }

    pub fn permission_checker(mut self, checker: Arc<dyn PermissionChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Augmentors run after the configured role mapping, in the order added.
    pub fn augmentor(mut self, augmentor: Arc<dyn IdentityAugmentor>) -> Self {
        self.augmentors.push(augmentor);
        self
    }

    pub fn mechanism(mut self, mechanism: Arc<dyn HttpAuthenticationMechanism>) -> Self {
        self.mechanisms.push(mechanism);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SecurityEventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointDeclaration) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Validate everything and seal the engine.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, duplicate mechanisms or checkers,
    /// unknown mechanism or policy names, and malformed endpoint declarations.
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> anyhow::Result<SecurityGateway> {
        let cfg = self.config;
        cfg.validate()?;

        let mut stack = AuthnStack::from_config(&cfg.authn())?;
        for provider in self.providers {
            stack = stack.with_provider(provider);
        }
        for augmentor in self.augmentors {
            stack = stack.with_augmentor(augmentor);
        }
        for mechanism in self.mechanisms {
            stack = stack.with_mechanism(mechanism);
        }
        let authn = stack.build();

        let mut mechanisms = authn.mechanisms;
        mechanisms.sort_by_key(|m| Reverse(m.priority()));
        let mut names = HashSet::new();
        for mechanism in &mechanisms {
            if !names.insert(mechanism.name().to_owned()) {
                bail!("authentication mechanism '{}' is registered twice", mechanism.name());
            }
        }
        for mechanism in &mechanisms {
            if let Some(missing) = mechanism
                .credential_types()
                .iter()
                .find(|request_type| !authn.providers.supports(**request_type))
            {
                bail!(
                    "authentication mechanism '{}' produces {missing:?} credentials but no identity provider accepts them",
                    mechanism.name()
                );
            }
        }
        let known = |name: &str| names.contains(name);

        if let Some(default) = &cfg.auth.default_mechanism
            && !known(default)
        {
            bail!("default mechanism '{default}' is not registered");
        }
        for permission in cfg.auth.permissions.iter().filter(|p| p.enabled) {
            if let Some(pin) = permission.auth_mechanism.as_deref()
                && !pin.trim().is_empty()
                && !known(pin.trim())
            {
                bail!(
                    "HTTP permission '{}' requires mechanism '{pin}' which is not registered",
                    permission.name
                );
            }
        }

        let policies = HttpPolicyEvaluator::from_config(&cfg.auth.permissions, &cfg.auth.policies, &self.policies)
            .context("invalid HTTP permissions")?;

        let mut authorization = AuthorizationEvaluator::new(cfg.auth.blocking_checkers);
        for checker in self.checkers {
            authorization.register(checker)?;
        }

        let mut endpoints = EndpointRegistry::new();
        for declaration in &self.endpoints {
            let resolved = endpoints.register(declaration)?;
            if let Some(mechanism) = &resolved.mechanism
                && !known(mechanism)
            {
                bail!("endpoint '{}' names unknown mechanism '{mechanism}'", resolved.name);
            }
            if let Some(check) = &resolved.check {
                authorization
                    .validate(check)
                    .with_context(|| format!("endpoint '{}'", resolved.name))?;
            }
        }

        info!(
            proactive = cfg.auth.proactive,
            mechanisms = ?names,
            permissions = policies.permissions().len(),
            endpoints = self.endpoints.len(),
            "Security gateway ready"
        );

        Ok(SecurityGateway {
            engine: Arc::new(Engine {
                proactive: cfg.auth.proactive,
                default_mechanism: cfg.auth.default_mechanism,
                providers: authn.providers,
                mechanisms,
                form: authn.form,
                policies,
                authorization,
                endpoints,
                events: EventBus::new(self.observers),
                failure_handler: self.failure_handler,
            }),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use async_trait::async_trait;
    use authn_sdk::{AuthNError, ChallengeData, IdentityProviderManager};
    use authz::HttpPermissionConfig;
    use authz_sdk::SecurityCheck;
    use http::Method;
    use warden_security::{RequestType, SecurityIdentity};

    use super::*;
    use crate::endpoint::DeclarationSite;

    struct Custom(i32);

    #[async_trait]
    impl HttpAuthenticationMechanism for Custom {
        fn name(&self) -> &str {
            "custom"
        }

        fn priority(&self) -> i32 {
            self.0
        }

        fn credential_types(&self) -> &[RequestType] {
            &[RequestType::TrustedPrincipal]
        }

        async fn authenticate(
            &self,
            _request: &RequestInfo,
            _providers: &dyn IdentityProviderManager,
        ) -> Result<Option<SecurityIdentity>, AuthNError> {
            Ok(None)
        }

        fn challenge(&self, _request: &RequestInfo) -> ChallengeData {
            ChallengeData::unauthorized()
        }
    }

    fn pinned(mechanism: &str) -> HttpPermissionConfig {
        HttpPermissionConfig {
            name: "pinned".to_owned(),
            paths: vec!["/a/*".to_owned()],
            policy: "authenticated".to_owned(),
            methods: Vec::new(),
            auth_mechanism: Some(mechanism.to_owned()),
            applies_to: authz::AppliesTo::All,
            shared: false,
            enabled: true,
        }
    }

    #[test]
    fn mechanisms_are_ordered_by_priority() {
        let gateway = SecurityGateway::builder(WardenConfig::default())
            .mechanism(Arc::new(Custom(5000)))
            .build()
            .unwrap();
        let names: Vec<&str> = gateway.mechanisms().collect();
        assert_eq!(names, vec!["custom", "basic"]);
    }

    #[test]
    fn duplicate_mechanism_is_rejected() {
        let err = SecurityGateway::builder(WardenConfig::default())
            .mechanism(Arc::new(Custom(1)))
            .mechanism(Arc::new(Custom(2)))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn mechanism_without_identity_provider_is_rejected() {
        let mut cfg = WardenConfig::default();
        cfg.auth.bearer.enabled = true;
        let err = SecurityGateway::builder(cfg.clone()).build().err().unwrap();
        assert!(err.to_string().contains("'bearer' produces Token credentials"));

        cfg.tokens.push(authn::config::TokenMapping {
            token: "t-1".to_owned().into(),
            principal: "svc".to_owned(),
            roles: Vec::new(),
            permissions: Vec::new(),
        });
        assert!(SecurityGateway::builder(cfg).build().is_ok());
    }

    #[test]
    fn unknown_default_mechanism_is_rejected() {
        let mut cfg = WardenConfig::default();
        cfg.auth.default_mechanism = Some("form".to_owned());
        let err = SecurityGateway::builder(cfg).build().err().unwrap();
        assert!(err.to_string().contains("default mechanism 'form'"));
    }

    #[test]
    fn unknown_pinned_mechanism_is_rejected() {
        let mut cfg = WardenConfig::default();
        cfg.auth.permissions.push(pinned("bearer"));
        let err = SecurityGateway::builder(cfg).build().err().unwrap();
        assert!(err.to_string().contains("'bearer' which is not registered"));

        let mut cfg = WardenConfig::default();
        cfg.auth.permissions.push(pinned("basic"));
        assert!(SecurityGateway::builder(cfg).build().is_ok());
    }

    #[test]
    fn endpoint_with_unknown_mechanism_is_rejected() {
        let err = SecurityGateway::builder(WardenConfig::default())
            .endpoint(
                EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
                    .on_method(DeclarationSite::new().mechanism("custom")),
            )
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown mechanism 'custom'"));
    }

    #[test]
    fn malformed_endpoint_permission_is_rejected() {
        let err = SecurityGateway::builder(WardenConfig::default())
            .endpoint(
                EndpointDeclaration::new(Method::GET, "/a", "Resource", "get").on_method(
                    DeclarationSite::new().check(SecurityCheck::Permissions(vec![
                        authz_sdk::PermissionsAllowed::any_of(["a:b:c"]),
                    ])),
                ),
            )
            .build()
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("Resource#get"));
    }
}
