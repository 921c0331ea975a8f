use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{AUTH_MECHANISM_ATTRIBUTE, REQUEST_ID_ATTRIBUTE};
use crate::permission::{CustomPermission, Permission, StringPermission};

/// Predicate deciding whether a possessed capability satisfies a required permission.
pub type PermissionCheckerFn = Arc<dyn Fn(&Permission) -> bool + Send + Sync>;

/// Correlation id of one HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `SecurityIdentity` is the resolved caller of a request.
///
/// Produced by an identity provider, transformed by augmentors and consumed
/// by authorization. It is never mutated in place: [`SecurityIdentity::builder_from`]
/// derives a new identity that shares every part it does not modify.
#[derive(Clone)]
pub struct SecurityIdentity {
    /// Principal name; `None` for the anonymous identity.
    principal: Option<Arc<str>>,
    roles: Arc<BTreeSet<String>>,
    permission_checkers: Arc<Vec<PermissionCheckerFn>>,
    attributes: Arc<HashMap<String, Value>>,
}

impl SecurityIdentity {
    /// Create a new `SecurityIdentity` builder for the given principal.
    #[must_use]
    pub fn builder(principal: impl Into<String>) -> SecurityIdentityBuilder {
        SecurityIdentityBuilder {
            principal: Some(Arc::from(principal.into())),
            roles: Arc::default(),
            permission_checkers: Arc::default(),
            attributes: Arc::default(),
        }
    }

    /// Derive a builder from an existing identity.
    #[must_use]
    pub fn builder_from(existing: &SecurityIdentity) -> SecurityIdentityBuilder {
        SecurityIdentityBuilder {
            principal: existing.principal.clone(),
            roles: Arc::clone(&existing.roles),
            permission_checkers: Arc::clone(&existing.permission_checkers),
            attributes: Arc::clone(&existing.attributes),
        }
    }

    /// The anonymous identity: no principal, no roles, no permissions.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            roles: Arc::default(),
            permission_checkers: Arc::default(),
            attributes: Arc::default(),
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }

    /// Principal name, empty for the anonymous identity.
    #[must_use]
    pub fn principal_name(&self) -> &str {
        self.principal.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Request this identity was resolved for, if recorded.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.attribute(REQUEST_ID_ATTRIBUTE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Mechanism that authenticated this identity, if recorded.
    #[must_use]
    pub fn auth_mechanism(&self) -> Option<&str> {
        self.attribute(AUTH_MECHANISM_ATTRIBUTE)
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn permission_checker_count(&self) -> usize {
        self.permission_checkers.len()
    }

    /// Whether any possessed capability implies `required`.
    ///
    /// Roles answer [`Permission::Role`]; every other permission is offered to
    /// the attached checker functions and the first `true` wins.
    #[must_use]
    pub fn implies(&self, required: &Permission) -> bool {
        if let Permission::Role(role) = required {
            return self.has_role(role);
        }
        self.permission_checkers.iter().any(|check| check(required))
    }

    /// Derive an identity that also holds the targets of every mapped role it has.
    ///
    /// Returns a plain clone when no mapping applies.
    #[must_use]
    pub fn map_roles(&self, mapping: &BTreeMap<String, Vec<String>>) -> SecurityIdentity {
        let added: Vec<&String> = self
            .roles
            .iter()
            .filter_map(|role| mapping.get(role))
            .flatten()
            .filter(|target| !self.roles.contains(*target))
            .collect();
        if added.is_empty() {
            return self.clone();
        }
        Self::builder_from(self).roles(added).build()
    }

    /// Whether the two identities share the same role set allocation.
    #[must_use]
    pub fn shares_roles_with(&self, other: &SecurityIdentity) -> bool {
        Arc::ptr_eq(&self.roles, &other.roles)
    }
}

impl fmt::Debug for SecurityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityIdentity")
            .field("principal", &self.principal)
            .field("roles", &self.roles)
            .field("permission_checkers", &self.permission_checkers.len())
            .field("attributes", &self.attributes)
            .finish()
    }
}

pub struct SecurityIdentityBuilder {
    principal: Option<Arc<str>>,
    roles: Arc<BTreeSet<String>>,
    permission_checkers: Arc<Vec<PermissionCheckerFn>>,
    attributes: Arc<HashMap<String, Value>>,
}

impl SecurityIdentityBuilder {
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !self.roles.contains(&role) {
            Arc::make_mut(&mut self.roles).insert(role);
        }
        self
    }

    #[must_use]
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for role in roles {
            self = self.role(role);
        }
        self
    }

    /// Attach a permission checker function.
    #[must_use]
    pub fn permission_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&Permission) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.permission_checkers).push(Arc::new(checker));
        self
    }

    /// Attach a possessed string permission.
    #[must_use]
    pub fn permission(self, possessed: StringPermission) -> Self {
        self.permission_checker(move |required| possessed.implies(required))
    }

    /// Attach a possessed custom permission.
    #[must_use]
    pub fn custom_permission(self, possessed: CustomPermission) -> Self {
        self.permission_checker(move |required| possessed.implies(required))
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.attributes).insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn request_id(self, request_id: RequestId) -> Self {
        self.attribute(
            REQUEST_ID_ATTRIBUTE,
            Value::String(request_id.as_uuid().to_string()),
        )
    }

    #[must_use]
    pub fn auth_mechanism(self, mechanism: &str) -> Self {
        self.attribute(AUTH_MECHANISM_ATTRIBUTE, Value::String(mechanism.to_owned()))
    }

    #[must_use]
    pub fn build(self) -> SecurityIdentity {
        SecurityIdentity {
            principal: self.principal,
            roles: self.roles,
            permission_checkers: self.permission_checkers,
            attributes: self.attributes,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_identity_builder_full() {
        let request_id = RequestId::new();
        let identity = SecurityIdentity::builder("alice")
            .roles(["admin", "user"])
            .permission(StringPermission::parse("read:all").unwrap())
            .attribute("tenant", json!("t-1"))
            .request_id(request_id)
            .auth_mechanism("basic")
            .build();

        assert!(!identity.is_anonymous());
        assert_eq!(identity.principal_name(), "alice");
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("user"));
        assert_eq!(identity.attribute("tenant"), Some(&json!("t-1")));
        assert_eq!(identity.request_id(), Some(request_id));
        assert_eq!(identity.auth_mechanism(), Some("basic"));
        assert_eq!(identity.permission_checker_count(), 1);
    }

    #[test]
    fn test_identity_anonymous() {
        let identity = SecurityIdentity::anonymous();

        assert!(identity.is_anonymous());
        assert_eq!(identity.principal_name(), "");
        assert!(identity.roles().is_empty());
        assert!(!identity.implies(&Permission::named("anything")));
        assert_eq!(identity.request_id(), None);
    }

    #[test]
    fn test_implies_roles_and_checkers() {
        let identity = SecurityIdentity::builder("bob")
            .role("user")
            .permission(StringPermission::parse("read:resource-user").unwrap())
            .build();

        assert!(identity.implies(&Permission::role("user")));
        assert!(!identity.implies(&Permission::role("admin")));
        assert!(identity.implies(&Permission::parse("read:resource-user").unwrap()));
        assert!(!identity.implies(&Permission::parse("read:resource-admin").unwrap()));
    }

    #[test]
    fn test_any_checker_authorizes() {
        let identity = SecurityIdentity::builder("carol")
            .permission_checker(|_| false)
            .permission_checker(|p| p.name() == "update")
            .build();

        assert!(identity.implies(&Permission::named("update")));
        assert!(!identity.implies(&Permission::named("create")));
    }

    #[test]
    fn test_builder_from_shares_unmodified_parts() {
        let original = SecurityIdentity::builder("dave")
            .role("user")
            .attribute("k", json!(1))
            .build();

        let with_checker = SecurityIdentity::builder_from(&original)
            .permission_checker(|_| true)
            .build();
        assert!(with_checker.shares_roles_with(&original));
        assert_eq!(original.permission_checker_count(), 0);
        assert_eq!(with_checker.permission_checker_count(), 1);

        let with_role = SecurityIdentity::builder_from(&original).role("admin").build();
        assert!(!with_role.shares_roles_with(&original));
        assert!(!original.has_role("admin"));
        assert!(with_role.has_role("admin"));
        assert_eq!(with_role.principal_name(), "dave");
    }

    #[test]
    fn test_adding_existing_role_keeps_sharing() {
        let original = SecurityIdentity::builder("erin").role("user").build();
        let derived = SecurityIdentity::builder_from(&original).role("user").build();
        assert!(derived.shares_roles_with(&original));
    }

    #[test]
    fn test_map_roles_adds_targets_only() {
        let identity = SecurityIdentity::builder("gina").role("Admin").build();
        let mapping = BTreeMap::from([
            ("Admin".to_owned(), vec!["admin".to_owned(), "user".to_owned()]),
            ("Guest".to_owned(), vec!["guest".to_owned()]),
        ]);

        let mapped = identity.map_roles(&mapping);
        assert!(mapped.has_role("Admin"));
        assert!(mapped.has_role("admin"));
        assert!(mapped.has_role("user"));
        assert!(!mapped.has_role("guest"));
        assert!(!identity.has_role("admin"));

        let unmapped = SecurityIdentity::builder("hal").role("other").build();
        assert!(unmapped.map_roles(&mapping).shares_roles_with(&unmapped));
    }

    #[test]
    fn test_debug_does_not_require_checker_debug() {
        let identity = SecurityIdentity::builder("frank")
            .permission_checker(|_| true)
            .build();
        let dbg = format!("{identity:?}");
        assert!(dbg.contains("SecurityIdentity"));
        assert!(dbg.contains("frank"));
    }
}
