//! Permission model.
//!
//! A [`Permission`] is either required by an endpoint or possessed by an
//! identity. Possession is expressed through permission checker functions on
//! [`SecurityIdentity`](crate::SecurityIdentity); [`StringPermission::implies`]
//! and [`CustomPermission::implies`] are the stock predicates those functions
//! delegate to.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::constants::PERMISSION_TO_ACTION_SEPARATOR;

/// Error raised when a `name:action` expression is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionParseError {
    #[error("permission expression must not be blank")]
    Blank,

    #[error(
        "permission '{0}' contains more than one separator ':', expected format is 'permissionName:action'"
    )]
    TooManySeparators(String),

    #[error("permission '{0}' has an empty name or action")]
    EmptyPart(String),
}

/// Named permission with an optional set of actions.
///
/// An empty action set on a possessed permission stands for "all actions".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringPermission {
    name: String,
    actions: BTreeSet<String>,
}

impl StringPermission {
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Permission without actions.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: BTreeSet::new(),
        }
    }

    /// Parse `name` or `name:action`.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionParseError`] for blank input, empty parts or more than one separator.
    pub fn parse(expression: &str) -> Result<Self, PermissionParseError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(PermissionParseError::Blank);
        }
        let mut parts = expression.split(PERMISSION_TO_ACTION_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        let action = parts.next();
        if parts.next().is_some() {
            return Err(PermissionParseError::TooManySeparators(
                expression.to_owned(),
            ));
        }
        if name.is_empty() || action.is_some_and(str::is_empty) {
            return Err(PermissionParseError::EmptyPart(expression.to_owned()));
        }
        Ok(Self::new(name, action))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn actions(&self) -> &BTreeSet<String> {
        &self.actions
    }

    /// Whether this possessed permission satisfies `required`.
    ///
    /// Names must match; an empty possessed action set covers every action,
    /// otherwise the required actions must be a non-empty subset.
    #[must_use]
    pub fn implies(&self, required: &Permission) -> bool {
        match required {
            Permission::Named(required) => {
                self.name == required.name && actions_imply(&self.actions, &required.actions)
            }
            Permission::Role(_) | Permission::Custom(_) => false,
        }
    }
}

impl fmt::Display for StringPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return f.write_str(&self.name);
        }
        let actions: Vec<&str> = self.actions.iter().map(String::as_str).collect();
        write!(
            f,
            "{}{PERMISSION_TO_ACTION_SEPARATOR}{}",
            self.name,
            actions.join(",")
        )
    }
}

/// Permission of an application-defined type bound to request parameters.
///
/// Parameters keep their declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomPermission {
    type_name: String,
    name: String,
    actions: BTreeSet<String>,
    params: Vec<(String, Value)>,
}

impl CustomPermission {
    #[must_use]
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            actions: BTreeSet::new(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn actions(&self) -> &BTreeSet<String> {
        &self.actions
    }

    #[must_use]
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Whether this possessed permission satisfies `required`.
    ///
    /// Same type and name, actions follow [`StringPermission`] rules and
    /// every parameter this permission pins must be bound to an equal value.
    #[must_use]
    pub fn implies(&self, required: &Permission) -> bool {
        let Permission::Custom(required) = required else {
            return false;
        };
        self.type_name == required.type_name
            && self.name == required.name
            && actions_imply(&self.actions, &required.actions)
            && self
                .params
                .iter()
                .all(|(name, value)| required.param(name) == Some(value))
    }
}

/// A capability an endpoint requires or an identity holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Permission {
    /// Satisfied by holding the role.
    Role(String),
    /// `name[:action]` permission.
    Named(StringPermission),
    /// Application-defined permission with bound parameters.
    Custom(CustomPermission),
}

impl Permission {
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role(role.into())
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(StringPermission::named(name))
    }

    /// Parse `name` or `name:action` into a [`Permission::Named`].
    ///
    /// # Errors
    ///
    /// See [`StringPermission::parse`].
    pub fn parse(expression: &str) -> Result<Self, PermissionParseError> {
        StringPermission::parse(expression).map(Self::Named)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Role(role) => role,
            Self::Named(p) => p.name(),
            Self::Custom(p) => p.name(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(role) => write!(f, "role:{role}"),
            Self::Named(p) => p.fmt(f),
            Self::Custom(p) => write!(f, "{}({})", p.type_name, p.name),
        }
    }
}

impl From<StringPermission> for Permission {
    fn from(value: StringPermission) -> Self {
        Self::Named(value)
    }
}

impl From<CustomPermission> for Permission {
    fn from(value: CustomPermission) -> Self {
        Self::Custom(value)
    }
}

fn actions_imply(possessed: &BTreeSet<String>, required: &BTreeSet<String>) -> bool {
    if possessed.is_empty() {
        return true;
    }
    !required.is_empty() && required.is_subset(possessed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_name_only() {
        let p = StringPermission::parse("create").unwrap();
        assert_eq!(p.name(), "create");
        assert!(p.actions().is_empty());
    }

    #[test]
    fn parse_name_and_action() {
        let p = StringPermission::parse("read:resource-admin").unwrap();
        assert_eq!(p.name(), "read");
        assert!(p.actions().contains("resource-admin"));
        assert_eq!(p.to_string(), "read:resource-admin");
    }

    #[test]
    fn parse_rejects_malformed_expressions() {
        assert_eq!(StringPermission::parse("  "), Err(PermissionParseError::Blank));
        assert!(matches!(
            StringPermission::parse("a:b:c"),
            Err(PermissionParseError::TooManySeparators(_))
        ));
        assert!(matches!(
            StringPermission::parse(":b"),
            Err(PermissionParseError::EmptyPart(_))
        ));
        assert!(matches!(
            StringPermission::parse("a:"),
            Err(PermissionParseError::EmptyPart(_))
        ));
    }

    #[test]
    fn possessed_action_implies_same_required_action() {
        let possessed = StringPermission::parse("read:resource-user").unwrap();

        assert!(possessed.implies(&Permission::parse("read:resource-user").unwrap()));
        assert!(!possessed.implies(&Permission::parse("read:resource-admin").unwrap()));
        assert!(!possessed.implies(&Permission::parse("write:resource-user").unwrap()));
    }

    #[test]
    fn possessed_without_actions_implies_every_action() {
        let possessed = StringPermission::named("read");

        assert!(possessed.implies(&Permission::named("read")));
        assert!(possessed.implies(&Permission::parse("read:anything").unwrap()));
    }

    #[test]
    fn possessed_with_actions_does_not_imply_all_actions() {
        let possessed = StringPermission::parse("read:one").unwrap();
        assert!(!possessed.implies(&Permission::named("read")));
    }

    #[test]
    fn string_permission_never_implies_other_kinds() {
        let possessed = StringPermission::named("admin");
        assert!(!possessed.implies(&Permission::role("admin")));
        assert!(!possessed.implies(&Permission::Custom(CustomPermission::new("T", "admin"))));
    }

    #[test]
    fn custom_permission_requires_matching_params() {
        let possessed = CustomPermission::new("OrderPermission", "read")
            .with_param("orderId", json!("42"));
        let required_ok = Permission::Custom(
            CustomPermission::new("OrderPermission", "read")
                .with_param("orderId", json!("42"))
                .with_param("tenant", json!("t1")),
        );
        let required_other = Permission::Custom(
            CustomPermission::new("OrderPermission", "read").with_param("orderId", json!("7")),
        );
        let required_other_type = Permission::Custom(
            CustomPermission::new("InvoicePermission", "read").with_param("orderId", json!("42")),
        );

        assert!(possessed.implies(&required_ok));
        assert!(!possessed.implies(&required_other));
        assert!(!possessed.implies(&required_other_type));
        assert!(!possessed.implies(&Permission::named("read")));
    }

    #[test]
    fn custom_permission_param_lookup_keeps_declaration_order() {
        let p = CustomPermission::new("T", "n")
            .with_param("b", json!(2))
            .with_param("a", json!(1));
        let names: Vec<&str> = p.params().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(p.param("a"), Some(&json!(1)));
        assert_eq!(p.param("c"), None);
    }
}
