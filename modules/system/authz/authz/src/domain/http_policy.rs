//! HTTP permission evaluation.
//!
//! Permissions are evaluated in declaration order: the first matching
//! non-shared permission plus every matching shared permission, all of which
//! must permit. Permissions scoped to resource endpoints are evaluated in a
//! separate stage once the endpoint is known.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use authn_sdk::{AuthNError, RequestInfo};
use authz_sdk::{AuthZError, HttpSecurityPolicy, IdentitySource};
use http::Method;
use warden_security::{SecurityIdentity, StringPermission};

use crate::config::{AppliesTo, HttpPermissionConfig, RolePolicyConfig};
use crate::path_matcher::PathPattern;
use crate::policies::{AUTHENTICATED, AuthenticatedPolicy, DENY, DenyPolicy, PERMIT, PermitPolicy, RolesPolicy};

/// One compiled HTTP permission.
pub struct HttpPermission {
    name: String,
    patterns: Vec<PathPattern>,
    methods: Vec<Method>,
    policy: Arc<dyn HttpSecurityPolicy>,
    auth_mechanism: Option<String>,
    applies_to: AppliesTo,
    shared: bool,
}

impl HttpPermission {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    #[must_use]
    pub fn auth_mechanism(&self) -> Option<&str> {
        self.auth_mechanism.as_deref()
    }

    #[must_use]
    pub fn applies_to(&self) -> AppliesTo {
        self.applies_to
    }

    fn matches(&self, path: &str, method: &Method) -> bool {
        (self.methods.is_empty() || self.methods.contains(method))
            && self.patterns.iter().any(|p| p.matches(path))
    }
}

impl std::fmt::Debug for HttpPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPermission")
            .field("name", &self.name)
            .field("policy", &self.policy.name())
            .field("auth_mechanism", &self.auth_mechanism)
            .field("applies_to", &self.applies_to)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// Policies that permitted the request, and the identity they left behind.
#[derive(Debug, Default)]
pub struct PolicyOutcome {
    /// Names of the evaluated policies, in evaluation order.
    pub policies: Vec<String>,
    /// Identity augmented by the policies, if any did.
    pub identity: Option<SecurityIdentity>,
}

/// A policy refused the request or failed.
#[derive(Debug, thiserror::Error)]
#[error("policy '{policy}': {error}")]
pub struct PolicyFailure {
    pub policy: String,
    #[source]
    pub error: AuthZError,
}

/// Ordered HTTP permission table. Read-only after construction.
#[derive(Debug, Default)]
pub struct HttpPolicyEvaluator {
    permissions: Vec<HttpPermission>,
}

impl HttpPolicyEvaluator {
    /// Compile the configured permissions.
    ///
    /// `custom` holds application policies by name; they take precedence over
    /// configured role policies of the same name.
    ///
    /// # Errors
    ///
    /// Rejects permissions without paths, with malformed paths or methods, with
    /// a blank mechanism pin, or naming an unknown policy.
    pub fn from_config(
        permissions: &[HttpPermissionConfig],
        role_policies: &BTreeMap<String, RolePolicyConfig>,
        custom: &HashMap<String, Arc<dyn HttpSecurityPolicy>>,
    ) -> anyhow::Result<Self> {
        let named = compile_role_policies(role_policies)?;
        let compiled = permissions
            .iter()
            .filter(|p| p.enabled)
            .map(|p| compile_permission(p, &named, custom))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            permissions: compiled,
        })
    }

    #[must_use]
    pub fn permissions(&self) -> &[HttpPermission] {
        &self.permissions
    }

    /// Permissions that apply to a request at the given stage, in evaluation order.
    pub fn matching<'s>(
        &'s self,
        path: &str,
        method: &Method,
        stage: AppliesTo,
    ) -> impl Iterator<Item = &'s HttpPermission> {
        let mut seen_exclusive = false;
        self.permissions
            .iter()
            .filter(move |p| p.applies_to == stage && p.matches(path, method))
            .filter(move |p| {
                if p.shared {
                    return true;
                }
                let first = !seen_exclusive;
                seen_exclusive = true;
                first
            })
    }

    /// Mechanism pinned for the request by the first matching permission that pins one.
    #[must_use]
    pub fn mechanism_pin(&self, path: &str, method: &Method, stage: AppliesTo) -> Option<&str> {
        self.matching(path, method, stage)
            .find_map(HttpPermission::auth_mechanism)
    }

    /// Evaluate the permissions of one stage.
    ///
    /// A permit carrying an augmented identity is visible to every later
    /// policy of the stage and returned in the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyFailure`] naming the first policy that did not permit. A
    /// denial maps to `Forbidden` when an authenticated identity is already
    /// resolved for the request and to `Unauthenticated` otherwise.
    pub async fn evaluate(
        &self,
        request: &RequestInfo,
        stage: AppliesTo,
        identity: &dyn IdentitySource,
    ) -> Result<PolicyOutcome, PolicyFailure> {
        let mut outcome = PolicyOutcome::default();
        for permission in self.matching(request.path(), request.method(), stage) {
            let policy = permission.policy.name().to_owned();
            tracing::debug!(
                permission = %permission.name,
                policy = %policy,
                path = %request.path(),
                "HTTP permission matched"
            );
            let source = Augmented {
                inner: identity,
                augmented: outcome.identity.clone(),
            };
            let result = match permission.policy.check(request, &source).await {
                Ok(result) => result,
                Err(error) => return Err(PolicyFailure { policy, error }),
            };
            if !result.is_permitted() {
                let error = match source.resolved() {
                    Some(id) if !id.is_anonymous() => {
                        AuthZError::forbidden(format!("denied by policy '{policy}'"))
                    }
                    _ => AuthZError::Unauthenticated,
                };
                return Err(PolicyFailure { policy, error });
            }
            if let Some(augmented) = result.into_augmented_identity() {
                outcome.identity = Some(augmented);
            }
            outcome.policies.push(policy);
        }
        Ok(outcome)
    }
}

/// Identity source seeing identities augmented earlier in the same stage.
struct Augmented<'a> {
    inner: &'a dyn IdentitySource,
    augmented: Option<SecurityIdentity>,
}

#[async_trait]
impl IdentitySource for Augmented<'_> {
    async fn identity(&self) -> Result<SecurityIdentity, AuthNError> {
        match &self.augmented {
            Some(identity) => Ok(identity.clone()),
            None => self.inner.identity().await,
        }
    }

    fn resolved(&self) -> Option<SecurityIdentity> {
        self.augmented.clone().or_else(|| self.inner.resolved())
    }
}

fn compile_role_policies(
    policies: &BTreeMap<String, RolePolicyConfig>,
) -> anyhow::Result<HashMap<String, Arc<dyn HttpSecurityPolicy>>> {
    policies
        .iter()
        .map(|(name, cfg)| {
            let granted = cfg
                .permissions
                .iter()
                .map(|(role, expressions)| {
                    let parsed = expressions
                        .iter()
                        .map(|e| StringPermission::parse(e))
                        .collect::<Result<Vec<_>, _>>()
                        .with_context(|| format!("invalid permission granted by policy '{name}'"))?;
                    Ok((role.clone(), parsed))
                })
                .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
            let policy: Arc<dyn HttpSecurityPolicy> = Arc::new(RolesPolicy::new(
                name.clone(),
                cfg.roles_allowed.clone(),
                cfg.roles.clone(),
                granted,
            ));
            Ok((name.clone(), policy))
        })
        .collect()
}

fn compile_permission(
    cfg: &HttpPermissionConfig,
    named: &HashMap<String, Arc<dyn HttpSecurityPolicy>>,
    custom: &HashMap<String, Arc<dyn HttpSecurityPolicy>>,
) -> anyhow::Result<HttpPermission> {
    if cfg.paths.is_empty() {
        bail!("HTTP permission '{}' has no paths", cfg.name);
    }
    if cfg.auth_mechanism.as_deref().is_some_and(|m| m.trim().is_empty()) {
        bail!("HTTP permission '{}' has a blank auth mechanism", cfg.name);
    }
    let patterns = cfg
        .paths
        .iter()
        .map(|p| PathPattern::parse(p))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("HTTP permission '{}'", cfg.name))?;
    let methods = cfg
        .methods
        .iter()
        .map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("HTTP permission '{}' has an invalid method", cfg.name))?;
    let policy: Arc<dyn HttpSecurityPolicy> = match cfg.policy.as_str() {
        PERMIT => Arc::new(PermitPolicy),
        DENY => Arc::new(DenyPolicy),
        AUTHENTICATED => Arc::new(AuthenticatedPolicy),
        other => custom
            .get(other)
            .or_else(|| named.get(other))
            .cloned()
            .with_context(|| {
                format!("HTTP permission '{}' refers to unknown policy '{other}'", cfg.name)
            })?,
    };
    Ok(HttpPermission {
        name: cfg.name.clone(),
        patterns,
        methods,
        policy,
        auth_mechanism: cfg.auth_mechanism.as_ref().map(|m| m.trim().to_owned()),
        applies_to: cfg.applies_to,
        shared: cfg.shared,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use authz_sdk::CheckResult;
    use parking_lot::Mutex;

    use super::*;

    /// Identity source counting on-demand resolutions.
    struct CountingSource {
        identity: SecurityIdentity,
        resolved: Mutex<Option<SecurityIdentity>>,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn new(identity: SecurityIdentity) -> Self {
            Self {
                identity,
                resolved: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentitySource for CountingSource {
        async fn identity(&self) -> Result<SecurityIdentity, AuthNError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.resolved.lock() = Some(self.identity.clone());
            Ok(self.identity.clone())
        }

        fn resolved(&self) -> Option<SecurityIdentity> {
            self.resolved.lock().clone()
        }
    }

    struct AddRolePolicy;

    #[async_trait]
    impl HttpSecurityPolicy for AddRolePolicy {
        fn name(&self) -> &str {
            "add-role"
        }

        async fn check(
            &self,
            _request: &RequestInfo,
            identity: &dyn IdentitySource,
        ) -> Result<CheckResult, AuthZError> {
            let identity = identity.identity().await?;
            Ok(CheckResult::permit_with(
                SecurityIdentity::builder_from(&identity).role("augmented").build(),
            ))
        }
    }

    fn permission(name: &str, paths: &[&str], policy: &str) -> HttpPermissionConfig {
        HttpPermissionConfig {
            name: name.to_owned(),
            paths: paths.iter().map(|p| (*p).to_owned()).collect(),
            policy: policy.to_owned(),
            methods: Vec::new(),
            auth_mechanism: None,
            applies_to: AppliesTo::All,
            shared: false,
            enabled: true,
        }
    }

    fn evaluator(permissions: &[HttpPermissionConfig]) -> HttpPolicyEvaluator {
        let policies = BTreeMap::from([(
            "admins".to_owned(),
            RolePolicyConfig {
                roles_allowed: vec!["admin".to_owned()],
                ..RolePolicyConfig::default()
            },
        )]);
        let custom: HashMap<String, Arc<dyn HttpSecurityPolicy>> =
            HashMap::from([("add-role".to_owned(), Arc::new(AddRolePolicy) as Arc<dyn HttpSecurityPolicy>)]);
        HttpPolicyEvaluator::from_config(permissions, &policies, &custom).unwrap()
    }

    fn request(method: Method, path: &str) -> RequestInfo {
        RequestInfo::new(method, path)
    }

    #[tokio::test]
    async fn first_match_wins_in_declaration_order() {
        let evaluator = evaluator(&[
            permission("open", &["/api/public/*"], "permit"),
            permission("closed", &["/api/*"], "deny"),
        ]);
        let source = CountingSource::new(SecurityIdentity::anonymous());

        let outcome = evaluator
            .evaluate(&request(Method::GET, "/api/public/x"), AppliesTo::All, &source)
            .await
            .unwrap();
        assert_eq!(outcome.policies, vec!["permit".to_owned()]);

        let failure = evaluator
            .evaluate(&request(Method::GET, "/api/private"), AppliesTo::All, &source)
            .await
            .unwrap_err();
        assert_eq!(failure.policy, "deny");
        assert!(matches!(failure.error, AuthZError::Unauthenticated));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deny_after_authentication_is_forbidden() {
        let evaluator = evaluator(&[permission("closed", &["/*"], "deny")]);
        let source = CountingSource::new(SecurityIdentity::builder("u").build());
        source.identity().await.unwrap();

        let failure = evaluator
            .evaluate(&request(Method::GET, "/x"), AppliesTo::All, &source)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AuthZError::Forbidden(_)));
    }

    #[tokio::test]
    async fn method_filter_restricts_matching() {
        let mut post_only = permission("writes", &["/items"], "deny");
        post_only.methods = vec!["post".to_owned()];
        let evaluator = evaluator(&[post_only]);
        let source = CountingSource::new(SecurityIdentity::anonymous());

        assert!(
            evaluator
                .evaluate(&request(Method::GET, "/items"), AppliesTo::All, &source)
                .await
                .unwrap()
                .policies
                .is_empty()
        );
        assert!(
            evaluator
                .evaluate(&request(Method::POST, "/items"), AppliesTo::All, &source)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn shared_permissions_are_combined() {
        let mut shared = permission("all-authenticated", &["/*"], "authenticated");
        shared.shared = true;
        let evaluator = evaluator(&[
            shared,
            permission("admin", &["/admin/*"], "admins"),
            permission("never-reached", &["/admin/*"], "deny"),
        ]);

        let user = CountingSource::new(SecurityIdentity::builder("u").role("admin").build());
        let outcome = evaluator
            .evaluate(&request(Method::GET, "/admin/x"), AppliesTo::All, &user)
            .await
            .unwrap();
        assert_eq!(outcome.policies, vec!["authenticated".to_owned(), "admins".to_owned()]);

        let anonymous = CountingSource::new(SecurityIdentity::anonymous());
        let failure = evaluator
            .evaluate(&request(Method::GET, "/admin/x"), AppliesTo::All, &anonymous)
            .await
            .unwrap_err();
        assert_eq!(failure.policy, "authenticated");
    }

    #[tokio::test]
    async fn role_policy_denial_of_authenticated_identity_is_forbidden() {
        let evaluator = evaluator(&[permission("admin", &["/admin/*"], "admins")]);
        let user = CountingSource::new(SecurityIdentity::builder("u").role("user").build());

        let failure = evaluator
            .evaluate(&request(Method::GET, "/admin"), AppliesTo::All, &user)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AuthZError::Forbidden(_)));
    }

    #[tokio::test]
    async fn stages_are_separate() {
        let mut endpoint_only = permission("endpoints", &["/*"], "deny");
        endpoint_only.applies_to = AppliesTo::Jaxrs;
        let evaluator = evaluator(&[endpoint_only]);
        let source = CountingSource::new(SecurityIdentity::anonymous());

        assert!(
            evaluator
                .evaluate(&request(Method::GET, "/x"), AppliesTo::All, &source)
                .await
                .is_ok()
        );
        assert!(
            evaluator
                .evaluate(&request(Method::GET, "/x"), AppliesTo::Jaxrs, &source)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn augmented_identity_is_returned_and_visible_to_later_policies() {
        let mut augmenting = permission("augment", &["/*"], "add-role");
        augmenting.shared = true;
        let evaluator = evaluator(&[augmenting, permission("auth", &["/*"], "authenticated")]);
        let source = CountingSource::new(SecurityIdentity::builder("u").build());

        let outcome = evaluator
            .evaluate(&request(Method::GET, "/x"), AppliesTo::All, &source)
            .await
            .unwrap();
        assert!(outcome.identity.unwrap().has_role("augmented"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mechanism_pin_comes_from_matching_permission() {
        let mut pinned = permission("basic-only", &["/basic/*"], "authenticated");
        pinned.auth_mechanism = Some("basic".to_owned());
        let evaluator = evaluator(&[pinned]);

        assert_eq!(
            evaluator.mechanism_pin("/basic/x", &Method::GET, AppliesTo::All),
            Some("basic")
        );
        assert_eq!(evaluator.mechanism_pin("/other", &Method::GET, AppliesTo::All), None);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let policies = BTreeMap::new();
        let custom = HashMap::new();

        let no_paths = permission("empty", &[], "permit");
        let err = HttpPolicyEvaluator::from_config(&[no_paths], &policies, &custom).unwrap_err();
        assert!(err.to_string().contains("has no paths"));

        let unknown = permission("unknown", &["/*"], "nope");
        let err = HttpPolicyEvaluator::from_config(&[unknown], &policies, &custom).unwrap_err();
        assert!(err.to_string().contains("unknown policy 'nope'"));

        let mut blank = permission("blank", &["/*"], "permit");
        blank.auth_mechanism = Some("  ".to_owned());
        let err = HttpPolicyEvaluator::from_config(&[blank], &policies, &custom).unwrap_err();
        assert!(err.to_string().contains("blank auth mechanism"));
    }

    #[test]
    fn disabled_permissions_are_skipped() {
        let mut disabled = permission("off", &["/*"], "deny");
        disabled.enabled = false;
        let evaluator = evaluator(&[disabled]);
        assert!(evaluator.permissions().is_empty());
    }
}
