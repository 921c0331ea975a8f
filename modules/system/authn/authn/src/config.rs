//! Configuration for the authentication stage.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthnConfig {
    pub basic: BasicConfig,
    pub form: FormConfig,
    pub mtls: MtlsConfig,
    pub bearer: BearerConfig,

    /// Global role mapping applied to every authenticated identity.
    pub roles_mapping: BTreeMap<String, Vec<String>>,

    /// Users known to the static identity provider.
    pub users: Vec<UserConfig>,

    /// Static bearer tokens.
    pub tokens: Vec<TokenMapping>,
}

/// HTTP Basic authentication.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BasicConfig {
    pub enabled: bool,
    pub realm: String,
    pub priority: i32,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            realm: "Warden".to_owned(),
            priority: 2000,
        }
    }
}

/// Form login with a signed credential cookie.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormConfig {
    pub enabled: bool,
    pub priority: i32,
    pub login_page: String,
    pub error_page: String,
    pub landing_page: String,
    pub post_location: String,
    pub username_parameter: String,
    pub password_parameter: String,
    pub cookie_name: String,
    /// Key the credential cookie is signed with. Required when form login is enabled.
    pub signing_key: SecretString,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 1000,
            login_page: "/login.html".to_owned(),
            error_page: "/error.html".to_owned(),
            landing_page: "/index.html".to_owned(),
            post_location: "/j_security_check".to_owned(),
            username_parameter: "j_username".to_owned(),
            password_parameter: "j_password".to_owned(),
            cookie_name: "warden-credential".to_owned(),
            signing_key: SecretString::from(String::new()),
        }
    }
}

/// Mutual TLS: the transport forwards the verified client certificate subject.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MtlsConfig {
    pub enabled: bool,
    pub priority: i32,
    /// Header carrying the subject DN when TLS terminates in front of the service.
    pub certificate_header: String,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 3000,
            certificate_header: "x-client-certificate".to_owned(),
        }
    }
}

/// Bearer tokens resolved against the static token table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BearerConfig {
    pub enabled: bool,
    pub priority: i32,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 1500,
        }
    }
}

/// A user of the static identity provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub username: String,
    pub password: SecretString,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Possessed permissions in `name[:action]` form.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Maps a static token to an identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenMapping {
    /// The bearer token value to match.
    pub token: SecretString,
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}
