//! Endpoint security metadata and its lookup by request.
//!
//! Endpoints are registered with the security declarations found along their
//! resolution chain: the declaration carrying the route, the owning type, the
//! implemented interfaces in declaration order and then the superclass chain.
//! The nearest mechanism and the nearest security check are resolved
//! independently, once, at registration.

use std::collections::HashMap;

use authz_sdk::SecurityCheck;
use http::Method;
use matchit::Router;

/// Security declarations found on one element of the resolution chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationSite {
    mechanism: Option<String>,
    check: Option<SecurityCheck>,
}

impl DeclarationSite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mechanism that must authenticate the endpoint.
    #[must_use]
    pub fn mechanism(mut self, name: impl Into<String>) -> Self {
        self.mechanism = Some(name.into());
        self
    }

    #[must_use]
    pub fn check(mut self, check: SecurityCheck) -> Self {
        self.check = Some(check);
        self
    }
}

/// Endpoint as supplied by the routing layer.
///
/// ```ignore
/// let endpoint = EndpointDeclaration::new(Method::GET, "/orders/{id}", "OrderResource", "get")
///     .on_method(DeclarationSite::new().mechanism("basic"))
///     .on_type(DeclarationSite::new().check(SecurityCheck::roles(["user"])));
/// ```
#[derive(Debug, Clone)]
pub struct EndpointDeclaration {
    method: Method,
    path: String,
    owner: String,
    operation: String,
    on_method: DeclarationSite,
    on_type: DeclarationSite,
    interfaces: Vec<DeclarationSite>,
    superclasses: Vec<DeclarationSite>,
}

impl EndpointDeclaration {
    /// `path` uses `{param}` or `:param` segments; `owner#operation` names the
    /// endpoint in authorization events.
    #[must_use]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        owner: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            owner: owner.into(),
            operation: operation.into(),
            on_method: DeclarationSite::default(),
            on_type: DeclarationSite::default(),
            interfaces: Vec::new(),
            superclasses: Vec::new(),
        }
    }

    /// Declarations on the operation that carries the route.
    ///
    /// An override that does not repeat the route is not part of the chain;
    /// the routed interface operation is passed here instead.
    #[must_use]
    pub fn on_method(mut self, site: DeclarationSite) -> Self {
        self.on_method = site;
        self
    }

    #[must_use]
    pub fn on_type(mut self, site: DeclarationSite) -> Self {
        self.on_type = site;
        self
    }

    /// Next implemented interface, in declaration order.
    #[must_use]
    pub fn on_interface(mut self, site: DeclarationSite) -> Self {
        self.interfaces.push(site);
        self
    }

    /// Next superclass, nearest first.
    #[must_use]
    pub fn on_superclass(mut self, site: DeclarationSite) -> Self {
        self.superclasses.push(site);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn chain(&self) -> impl Iterator<Item = &DeclarationSite> {
        std::iter::once(&self.on_method)
            .chain(std::iter::once(&self.on_type))
            .chain(&self.interfaces)
            .chain(&self.superclasses)
    }

    /// Resolve the nearest declarations.
    #[must_use]
    pub fn resolve(&self) -> ResolvedEndpoint {
        let mechanism = self.chain().find_map(|site| site.mechanism.clone());
        let declared = self.chain().find_map(|site| site.check.clone());
        // A named mechanism without a security check still requires authentication.
        let check = match (&mechanism, declared) {
            (Some(_), None) => Some(SecurityCheck::Authenticated),
            (_, declared) => declared,
        };
        ResolvedEndpoint {
            name: format!("{}#{}", self.owner, self.operation),
            mechanism,
            check,
        }
    }
}

/// Security metadata of an endpoint after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// `Owner#operation`, as reported in authorization events.
    pub name: String,
    /// Mechanism named by the nearest declaration.
    pub mechanism: Option<String>,
    /// Check enforced before the endpoint runs.
    pub check: Option<SecurityCheck>,
}

impl ResolvedEndpoint {
    /// Whether the check looks at call arguments, so the request body must be bound.
    #[must_use]
    pub fn reads_arguments(&self) -> bool {
        matches!(self.check, Some(SecurityCheck::Permissions(_)))
    }
}

/// A request routed to a registered endpoint.
#[derive(Debug, Clone)]
pub struct EndpointMatch<'a> {
    pub endpoint: &'a ResolvedEndpoint,
    /// Path parameters, in path order.
    pub params: Vec<(String, String)>,
}

/// Route matcher for a specific HTTP method.
#[derive(Clone)]
struct RouteMatcher {
    matcher: Router<usize>,
}

impl RouteMatcher {
    fn new() -> Self {
        Self {
            matcher: Router::new(),
        }
    }

    fn insert(&mut self, path: &str, index: usize) -> Result<(), matchit::InsertError> {
        self.matcher.insert(path, index)
    }

    fn find(&self, path: &str) -> Option<(usize, Vec<(String, String)>)> {
        let matched = self.matcher.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((*matched.value, params))
    }
}

/// Registered endpoints, looked up by method and path. Read-only once built.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    matchers: HashMap<Method, RouteMatcher>,
    endpoints: Vec<ResolvedEndpoint>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and register an endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the path is malformed or already registered for the method.
    pub fn register(&mut self, declaration: &EndpointDeclaration) -> anyhow::Result<&ResolvedEndpoint> {
        let index = self.endpoints.len();
        let matchit_path = convert_axum_path_to_matchit(declaration.path());
        self.matchers
            .entry(declaration.method().clone())
            .or_insert_with(RouteMatcher::new)
            .insert(&matchit_path, index)
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to insert route pattern '{} {}': {e}",
                    declaration.method(),
                    declaration.path()
                )
            })?;
        let resolved = declaration.resolve();
        tracing::debug!(
            endpoint = %resolved.name,
            mechanism = ?resolved.mechanism,
            check = ?resolved.check,
            "Endpoint registered"
        );
        self.endpoints.push(resolved);
        Ok(&self.endpoints[index])
    }

    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<EndpointMatch<'_>> {
        let (index, params) = self.matchers.get(method)?.find(path)?;
        self.endpoints.get(index).map(|endpoint| EndpointMatch { endpoint, params })
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &ResolvedEndpoint> {
        self.endpoints.iter()
    }
}

/// Convert Axum path syntax `:param` to matchit syntax `{param}`.
fn convert_axum_path_to_matchit(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == ':' {
            result.push('{');
            while matches!(chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
                if let Some(c) = chars.next() {
                    result.push(c);
                }
            }
            result.push('}');
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use authz_sdk::PermissionsAllowed;

    use super::*;

    #[test]
    fn test_convert_axum_path_to_matchit() {
        assert_eq!(convert_axum_path_to_matchit("/users/:id"), "/users/{id}");
        assert_eq!(
            convert_axum_path_to_matchit("/posts/:post_id/comments/:comment_id"),
            "/posts/{post_id}/comments/{comment_id}"
        );
        assert_eq!(convert_axum_path_to_matchit("/health"), "/health");
        assert_eq!(convert_axum_path_to_matchit("/orders/{id}"), "/orders/{id}");
    }

    #[test]
    fn method_mechanism_overrides_type_mechanism() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_method(DeclarationSite::new().mechanism("basic"))
            .on_type(DeclarationSite::new().mechanism("form"))
            .resolve();
        assert_eq!(resolved.mechanism.as_deref(), Some("basic"));
        assert_eq!(resolved.name, "Resource#get");
    }

    #[test]
    fn routed_override_uses_its_own_mechanism_and_plain_override_inherits() {
        let interface_operation = DeclarationSite::new().mechanism("custom");
        let override_operation = DeclarationSite::new().mechanism("basic");
        let declare = |routed: DeclarationSite| {
            EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
                .on_method(routed)
                .on_interface(DeclarationSite::new())
                .resolve()
        };

        // The override repeats the route, so it is the routed operation.
        let repeated = declare(override_operation);
        assert_eq!(repeated.mechanism.as_deref(), Some("basic"));

        // The override does not repeat the route; the interface operation carries it.
        let inherited = declare(interface_operation);
        assert_eq!(inherited.mechanism.as_deref(), Some("custom"));
        assert_eq!(inherited.check, Some(SecurityCheck::Authenticated));
    }

    #[test]
    fn type_mechanism_applies_when_method_names_none() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_type(DeclarationSite::new().mechanism("form"))
            .on_interface(DeclarationSite::new().mechanism("basic"))
            .resolve();
        assert_eq!(resolved.mechanism.as_deref(), Some("form"));
    }

    #[test]
    fn interfaces_resolve_in_declaration_order_before_superclasses() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_interface(DeclarationSite::new())
            .on_interface(DeclarationSite::new().mechanism("custom"))
            .on_superclass(DeclarationSite::new().mechanism("basic"))
            .resolve();
        assert_eq!(resolved.mechanism.as_deref(), Some("custom"));
    }

    #[test]
    fn mechanism_and_check_resolve_independently() {
        // The routed operation names a mechanism only; the check comes from the interface.
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_method(DeclarationSite::new().mechanism("basic"))
            .on_interface(DeclarationSite::new().check(SecurityCheck::roles(["admin"])))
            .resolve();
        assert_eq!(resolved.mechanism.as_deref(), Some("basic"));
        assert_eq!(resolved.check, Some(SecurityCheck::roles(["admin"])));
    }

    #[test]
    fn nearest_roles_replace_ancestor_roles() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_method(DeclarationSite::new().check(SecurityCheck::roles(["user"])))
            .on_type(DeclarationSite::new().check(SecurityCheck::roles(["admin"])))
            .resolve();
        assert_eq!(resolved.check, Some(SecurityCheck::roles(["user"])));
    }

    #[test]
    fn explicit_mechanism_implies_authentication() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_type(DeclarationSite::new().mechanism("basic"))
            .resolve();
        assert_eq!(resolved.check, Some(SecurityCheck::Authenticated));

        let unsecured = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get").resolve();
        assert_eq!(unsecured.check, None);
        assert_eq!(unsecured.mechanism, None);
    }

    #[test]
    fn explicit_permit_all_is_kept_with_mechanism() {
        let resolved = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get")
            .on_method(DeclarationSite::new().mechanism("basic").check(SecurityCheck::PermitAll))
            .resolve();
        assert_eq!(resolved.check, Some(SecurityCheck::PermitAll));
    }

    #[test]
    fn registry_matches_method_and_params() {
        let mut registry = EndpointRegistry::new();
        registry
            .register(
                &EndpointDeclaration::new(Method::GET, "/orders/:id", "OrderResource", "get")
                    .on_method(DeclarationSite::new().check(SecurityCheck::Permissions(vec![
                        PermissionsAllowed::any_of(["read"]),
                    ]))),
            )
            .unwrap();
        registry
            .register(&EndpointDeclaration::new(Method::POST, "/orders", "OrderResource", "create"))
            .unwrap();

        let found = registry.find(&Method::GET, "/orders/42").unwrap();
        assert_eq!(found.endpoint.name, "OrderResource#get");
        assert_eq!(found.params, vec![("id".to_owned(), "42".to_owned())]);

        assert!(registry.find(&Method::POST, "/orders/42").is_none());
        assert!(registry.find(&Method::GET, "/orders").is_none());
        assert_eq!(registry.endpoints().count(), 2);
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut registry = EndpointRegistry::new();
        let declaration = EndpointDeclaration::new(Method::GET, "/a", "Resource", "get");
        registry.register(&declaration).unwrap();
        assert!(registry.register(&declaration).is_err());
    }
}
