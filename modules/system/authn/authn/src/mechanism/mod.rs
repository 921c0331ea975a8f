//! Built-in HTTP authentication mechanisms.

pub mod basic;
pub mod bearer;
pub mod form;
pub mod mtls;

pub use basic::BasicAuthenticationMechanism;
pub use bearer::BearerAuthenticationMechanism;
pub use form::{FormAuthenticationMechanism, FormLogin};
pub use mtls::MtlsAuthenticationMechanism;

use authn_sdk::RequestInfo;
use http::header;

/// Credentials of `Authorization: <scheme> <credentials>`, scheme matched case-insensitively.
fn authorization_credentials<'a>(request: &'a RequestInfo, scheme: &str) -> Option<&'a str> {
    let value = request.header(header::AUTHORIZATION.as_str())?;
    let (given, credentials) = value.split_once(' ')?;
    given
        .eq_ignore_ascii_case(scheme)
        .then_some(credentials.trim())
}
