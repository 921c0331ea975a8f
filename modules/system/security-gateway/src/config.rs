//! Top-level configuration and its loader.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use authn::AuthnConfig;
use authn::config::{BasicConfig, BearerConfig, FormConfig, MtlsConfig, TokenMapping, UserConfig};
use authz::{HttpPermissionConfig, RolePolicyConfig};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

/// Environment variable prefix of configuration overrides.
pub const ENV_PREFIX: &str = "WARDEN_";

/// Separator of nested keys in environment overrides, e.g. `WARDEN_AUTH__PROACTIVE`.
pub const ENV_NESTING_SEPARATOR: &str = "__";

/// Whole Warden configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    pub auth: AuthConfig,
    /// Users known to the static identity provider.
    pub users: Vec<UserConfig>,
    /// Static bearer tokens.
    pub tokens: Vec<TokenMapping>,
}

/// Authentication and authorization settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Authenticate every request on arrival instead of on first use.
    pub proactive: bool,

    /// Mechanism used when neither an endpoint nor a permission selects one.
    /// Unset means every registered mechanism, by descending priority.
    pub default_mechanism: Option<String>,

    /// Whether blocking-capable workers are available to permission checkers.
    pub blocking_checkers: bool,

    pub basic: BasicConfig,
    pub form: FormConfig,
    pub mtls: MtlsConfig,
    pub bearer: BearerConfig,

    /// HTTP permissions, in evaluation order.
    pub permissions: Vec<HttpPermissionConfig>,

    /// Named role policies referenced by permissions.
    pub policies: BTreeMap<String, RolePolicyConfig>,

    /// Global role mapping applied to every authenticated identity.
    pub roles_mapping: BTreeMap<String, Vec<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            proactive: false,
            default_mechanism: None,
            blocking_checkers: true,
            basic: BasicConfig::default(),
            form: FormConfig::default(),
            mtls: MtlsConfig::default(),
            bearer: BearerConfig::default(),
            permissions: Vec::new(),
            policies: BTreeMap::new(),
            roles_mapping: BTreeMap::new(),
        }
    }
}

impl WardenConfig {
    /// Settings of the authentication stack.
    #[must_use]
    pub fn authn(&self) -> AuthnConfig {
        AuthnConfig {
            basic: self.auth.basic.clone(),
            form: self.auth.form.clone(),
            mtls: self.auth.mtls.clone(),
            bearer: self.auth.bearer.clone(),
            roles_mapping: self.auth.roles_mapping.clone(),
            users: self.users.clone(),
            tokens: self.tokens.clone(),
        }
    }

    /// Checks that need no registered components.
    ///
    /// Mechanism names are checked once mechanisms are registered, see
    /// [`SecurityGatewayBuilder::build`](crate::SecurityGatewayBuilder::build).
    ///
    /// # Errors
    ///
    /// Rejects blank names and permissions without paths.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self
            .auth
            .default_mechanism
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            bail!("auth.default_mechanism must not be blank");
        }
        for permission in &self.auth.permissions {
            if permission.name.trim().is_empty() {
                bail!("HTTP permission without a name");
            }
            if permission.paths.is_empty() {
                bail!("HTTP permission '{}' has no paths", permission.name);
            }
        }
        Ok(())
    }
}

/// Loads [`WardenConfig`] from a YAML file and `WARDEN_` environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Merge the file (if any) and the environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or validation fails.
    pub fn load(&self) -> anyhow::Result<WardenConfig> {
        let mut figment = Figment::new();
        if let Some(path) = &self.path {
            if !path.exists() {
                bail!("configuration file {} not found", path.display());
            }
            figment = figment.merge(Yaml::file(path));
            tracing::info!(path = %path.display(), "Loading security configuration");
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_NESTING_SEPARATOR)))
    }

    /// Parse an inline YAML document, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or validation fails.
    pub fn load_str(yaml: &str) -> anyhow::Result<WardenConfig> {
        Self::extract(
            Figment::new()
                .merge(Yaml::string(yaml))
                .merge(Env::prefixed(ENV_PREFIX).split(ENV_NESTING_SEPARATOR)),
        )
    }

    fn extract(figment: Figment) -> anyhow::Result<WardenConfig> {
        let config: WardenConfig = figment
            .extract()
            .context("failed to extract security configuration")?;
        config.validate()?;
        Ok(config)
    }
}
