//! Endpoint-level security declarations.

use serde::{Deserialize, Serialize};

/// Role-based access control declaration of an endpoint or an enclosing type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCheck {
    /// No identity required.
    PermitAll,
    /// Never allowed.
    DenyAll,
    /// Any non-anonymous identity.
    Authenticated,
    /// Any one of the roles; `**` stands for any authenticated identity.
    RolesAllowed(Vec<String>),
    /// Every entry must pass.
    Permissions(Vec<PermissionsAllowed>),
}

impl SecurityCheck {
    #[must_use]
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RolesAllowed(roles.into_iter().map(Into::into).collect())
    }

    /// Whether the check can pass for the anonymous identity.
    #[must_use]
    pub fn allows_anonymous(&self) -> bool {
        matches!(self, Self::PermitAll)
    }
}

/// Kind of permission a [`PermissionsAllowed`] value names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// `name[:action]` string permissions.
    #[default]
    String,
    /// Application-defined permission type bound to request parameters.
    Custom { type_name: String },
}

/// One permissions declaration.
///
/// Values are alternatives unless `inclusive` is set, in which case all of
/// them are required. A value that names a registered permission checker is
/// decided by that checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsAllowed {
    pub values: Vec<String>,
    #[serde(default)]
    pub inclusive: bool,
    #[serde(default)]
    pub kind: PermissionKind,
    /// Argument paths bound into custom permissions, e.g. `bean.headers.authorization`.
    /// Empty binds every top-level argument.
    #[serde(default)]
    pub params: Vec<String>,
}

impl PermissionsAllowed {
    /// Any one of `values`.
    #[must_use]
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            inclusive: false,
            kind: PermissionKind::String,
            params: Vec::new(),
        }
    }

    /// All of `values`.
    #[must_use]
    pub fn all_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inclusive: true,
            ..Self::any_of(values)
        }
    }

    /// Require an application-defined permission type.
    #[must_use]
    pub fn custom(mut self, type_name: impl Into<String>) -> Self {
        self.kind = PermissionKind::Custom {
            type_name: type_name.into(),
        };
        self
    }

    #[must_use]
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }
}

/// A checked operation: its qualified name plus the declaration to enforce.
///
/// The name is reported in authorization events, e.g. `OrderResource#get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredMethod {
    pub name: String,
    pub check: SecurityCheck,
}

impl SecuredMethod {
    #[must_use]
    pub fn new(name: impl Into<String>, check: SecurityCheck) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let any = PermissionsAllowed::any_of(["read:a", "read:b"]);
        assert!(!any.inclusive);
        assert_eq!(any.kind, PermissionKind::String);

        let all = PermissionsAllowed::all_of(["create", "update"]);
        assert!(all.inclusive);

        let custom = PermissionsAllowed::any_of(["get"])
            .custom("OrderPermission")
            .params(["orderId"]);
        assert_eq!(
            custom.kind,
            PermissionKind::Custom {
                type_name: "OrderPermission".to_owned()
            }
        );
        assert_eq!(custom.params, vec!["orderId".to_owned()]);
    }

    #[test]
    fn only_permit_all_allows_anonymous() {
        assert!(SecurityCheck::PermitAll.allows_anonymous());
        assert!(!SecurityCheck::Authenticated.allows_anonymous());
        assert!(!SecurityCheck::roles(["**"]).allows_anonymous());
    }

    #[test]
    fn deserializes_from_config_shape() {
        let check: SecurityCheck = serde_json::from_str(
            r#"{"permissions":[{"values":["read:resource-admin","read:resource-user"]}]}"#,
        )
        .unwrap();
        assert_eq!(
            check,
            SecurityCheck::Permissions(vec![PermissionsAllowed::any_of([
                "read:resource-admin",
                "read:resource-user"
            ])])
        );
    }
}
