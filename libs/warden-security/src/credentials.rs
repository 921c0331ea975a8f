//! Typed credential requests.
//!
//! Mechanisms extract credentials from a request and wrap them into an
//! [`AuthenticationRequest`]; identity providers self-select on
//! [`AuthenticationRequest::request_type`].

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Discriminant of an [`AuthenticationRequest`], used to route it to providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    UsernamePassword,
    TrustedPrincipal,
    Certificate,
    Token,
}

/// Username and password, as sent by basic and form authentication.
#[derive(Debug, Clone)]
pub struct UsernamePasswordRequest {
    pub username: String,
    pub password: SecretString,
}

/// A principal whose identity was already established by a trusted source
/// (for instance a signed session cookie).
#[derive(Debug, Clone)]
pub struct TrustedPrincipalRequest {
    pub principal: String,
}

/// Client certificate identity presented during the TLS handshake.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    /// Subject distinguished name, e.g. `CN=client,O=Warden`.
    pub subject: String,
}

impl CertificateRequest {
    /// Common name extracted from the subject, if present.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .split(',')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("CN="))
    }
}

/// Opaque bearer token.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub token: SecretString,
}

/// Credential bundle handed to identity providers.
#[derive(Debug, Clone)]
pub enum AuthenticationRequest {
    UsernamePassword(UsernamePasswordRequest),
    TrustedPrincipal(TrustedPrincipalRequest),
    Certificate(CertificateRequest),
    Token(TokenRequest),
}

impl AuthenticationRequest {
    #[must_use]
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::UsernamePassword(_) => RequestType::UsernamePassword,
            Self::TrustedPrincipal(_) => RequestType::TrustedPrincipal,
            Self::Certificate(_) => RequestType::Certificate,
            Self::Token(_) => RequestType::Token,
        }
    }

    #[must_use]
    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UsernamePassword(UsernamePasswordRequest {
            username: username.into(),
            password: SecretString::from(password.into()),
        })
    }

    #[must_use]
    pub fn trusted(principal: impl Into<String>) -> Self {
        Self::TrustedPrincipal(TrustedPrincipalRequest {
            principal: principal.into(),
        })
    }

    #[must_use]
    pub fn certificate(subject: impl Into<String>) -> Self {
        Self::Certificate(CertificateRequest {
            subject: subject.into(),
        })
    }

    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(TokenRequest {
            token: SecretString::from(token.into()),
        })
    }
}
