//! Built-in HTTP security policies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use authn_sdk::RequestInfo;
use authz_sdk::{AuthZError, CheckResult, HttpSecurityPolicy, IdentitySource};
use warden_security::constants::ANY_AUTHENTICATED_ROLE;
use warden_security::{SecurityIdentity, StringPermission};

pub const PERMIT: &str = "permit";
pub const DENY: &str = "deny";
pub const AUTHENTICATED: &str = "authenticated";

/// Permits without looking at the identity.
pub struct PermitPolicy;

#[async_trait]
impl HttpSecurityPolicy for PermitPolicy {
    fn name(&self) -> &str {
        PERMIT
    }

    async fn check(
        &self,
        _request: &RequestInfo,
        _identity: &dyn IdentitySource,
    ) -> Result<CheckResult, AuthZError> {
        Ok(CheckResult::permit())
    }
}

/// Denies without looking at the identity.
pub struct DenyPolicy;

#[async_trait]
impl HttpSecurityPolicy for DenyPolicy {
    fn name(&self) -> &str {
        DENY
    }

    async fn check(
        &self,
        _request: &RequestInfo,
        _identity: &dyn IdentitySource,
    ) -> Result<CheckResult, AuthZError> {
        Ok(CheckResult::deny())
    }
}

/// Requires a non-anonymous identity.
pub struct AuthenticatedPolicy;

#[async_trait]
impl HttpSecurityPolicy for AuthenticatedPolicy {
    fn name(&self) -> &str {
        AUTHENTICATED
    }

    async fn check(
        &self,
        _request: &RequestInfo,
        identity: &dyn IdentitySource,
    ) -> Result<CheckResult, AuthZError> {
        let identity = identity.identity().await?;
        Ok(if identity.is_anonymous() {
            CheckResult::deny()
        } else {
            CheckResult::permit()
        })
    }
}

/// Named role policy.
///
/// Before the check, `roles` maps held roles to additional roles and
/// `permissions` grants permissions to held roles. The resulting identity
/// replaces the request identity when the policy permits.
pub struct RolesPolicy {
    name: String,
    roles_allowed: Vec<String>,
    roles_mapping: BTreeMap<String, Vec<String>>,
    granted: BTreeMap<String, Vec<StringPermission>>,
}

impl RolesPolicy {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        roles_allowed: Vec<String>,
        roles_mapping: BTreeMap<String, Vec<String>>,
        granted: BTreeMap<String, Vec<StringPermission>>,
    ) -> Self {
        Self {
            name: name.into(),
            roles_allowed,
            roles_mapping,
            granted,
        }
    }

    fn augment(&self, identity: &SecurityIdentity) -> Option<SecurityIdentity> {
        let mapped = identity.map_roles(&self.roles_mapping);
        let grants: Vec<&StringPermission> = mapped
            .roles()
            .iter()
            .filter_map(|role| self.granted.get(role))
            .flatten()
            .collect();
        let changed = !mapped.shares_roles_with(identity) || !grants.is_empty();
        if !changed {
            return None;
        }
        let augmented = grants
            .into_iter()
            .fold(SecurityIdentity::builder_from(&mapped), |builder, p| {
                builder.permission(p.clone())
            })
            .build();
        Some(augmented)
    }

    fn allows(&self, identity: &SecurityIdentity) -> bool {
        self.roles_allowed
            .iter()
            .any(|role| {
                if role == ANY_AUTHENTICATED_ROLE {
                    !identity.is_anonymous()
                } else {
                    identity.has_role(role)
                }
            })
    }
}

#[async_trait]
impl HttpSecurityPolicy for RolesPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        _request: &RequestInfo,
        identity: &dyn IdentitySource,
    ) -> Result<CheckResult, AuthZError> {
        let identity = identity.identity().await?;
        let augmented = self.augment(&identity);
        let effective = augmented.as_ref().unwrap_or(&identity);
        if !self.allows(effective) {
            return Ok(CheckResult::deny());
        }
        Ok(augmented.map_or_else(CheckResult::permit, CheckResult::permit_with))
    }
}
