//! Configuration of HTTP permissions and named role policies.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Which requests an HTTP permission applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    /// Every request, evaluated on arrival.
    #[default]
    All,
    /// Only requests routed to a resource endpoint, evaluated once the endpoint is known.
    Jaxrs,
}

/// One HTTP permission entry. Entries are evaluated in declaration order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpPermissionConfig {
    pub name: String,
    pub paths: Vec<String>,
    /// `permit`, `deny`, `authenticated`, a configured role policy or a registered custom policy.
    pub policy: String,
    /// Request methods this entry is restricted to; empty means all methods.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Mechanism that must authenticate matching requests.
    #[serde(default)]
    pub auth_mechanism: Option<String>,
    #[serde(default)]
    pub applies_to: AppliesTo,
    /// Shared entries are evaluated in addition to the first matching non-shared one.
    #[serde(default)]
    pub shared: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Named role policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RolePolicyConfig {
    /// Roles of which one is required; `**` means any authenticated identity.
    pub roles_allowed: Vec<String>,
    /// Additional roles granted to holders of a role before the check.
    pub roles: BTreeMap<String, Vec<String>>,
    /// Permissions in `name[:action]` form granted to holders of a role.
    pub permissions: BTreeMap<String, Vec<String>>,
}
