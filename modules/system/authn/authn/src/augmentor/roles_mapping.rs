//! Global role mapping.

use std::collections::BTreeMap;

use async_trait::async_trait;
use authn_sdk::{AuthNError, IdentityAugmentor, RequestInfo};
use warden_security::SecurityIdentity;

/// Grants the mapped target roles to every identity holding a source role.
pub struct RolesMappingAugmentor {
    mapping: BTreeMap<String, Vec<String>>,
}

impl RolesMappingAugmentor {
    #[must_use]
    pub fn new(mapping: BTreeMap<String, Vec<String>>) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl IdentityAugmentor for RolesMappingAugmentor {
    fn name(&self) -> &str {
        "roles-mapping"
    }

    async fn augment(
        &self,
        identity: SecurityIdentity,
        _context: &RequestInfo,
    ) -> Result<SecurityIdentity, AuthNError> {
        Ok(identity.map_roles(&self.mapping))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use http::Method;

    use super::*;

    #[tokio::test]
    async fn maps_roles_and_passes_anonymous_through() {
        let augmentor = RolesMappingAugmentor::new(BTreeMap::from([(
            "Admin".to_owned(),
            vec!["admin".to_owned()],
        )]));
        let context = RequestInfo::new(Method::GET, "/");

        let identity = SecurityIdentity::builder("root").role("Admin").build();
        let mapped = augmentor.augment(identity, &context).await.unwrap();
        assert!(mapped.has_role("admin"));

        let anonymous = augmentor
            .augment(SecurityIdentity::anonymous(), &context)
            .await
            .unwrap();
        assert!(anonymous.is_anonymous());
        assert!(anonymous.roles().is_empty());
    }
}
