//! Failures surfaced to the HTTP layer and their responses.

use std::sync::Arc;

use authn_sdk::{ChallengeData, RequestInfo};
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;

/// Media type of problem documents.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Why a request was not allowed through.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecurityFailure {
    /// No valid identity where one is required; carries the mechanism's challenge.
    #[error("authentication required")]
    Unauthenticated(ChallengeData),

    /// The identity lacks the required rights.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// An HTTP permission pins a mechanism other than the one the endpoint selects.
    #[error("mechanism '{pinned}' required by HTTP permission conflicts with endpoint mechanism '{selected}'")]
    MechanismMismatch { pinned: String, selected: String },

    /// The mechanism asks the client to go elsewhere, e.g. to a login page.
    #[error("redirect requested")]
    Redirect(ChallengeData),

    /// A provider, augmentor, checker or policy failed.
    #[error("{0}")]
    Unhandled(String),
}

fn location(challenge: &ChallengeData) -> &str {
    challenge
        .headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

impl SecurityFailure {
    /// Unauthenticated, or a redirect when the challenge is one.
    #[must_use]
    pub fn challenge(challenge: ChallengeData) -> Self {
        if challenge.is_redirect() {
            Self::Redirect(challenge)
        } else {
            Self::Unauthenticated(challenge)
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::MechanismMismatch { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Redirect(challenge) => challenge.status,
            Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn problem(&self) -> Problem {
        match self {
            Self::Unauthenticated(_) => {
                Problem::new(StatusCode::UNAUTHORIZED, "Unauthorized", "Authentication required")
            }
            Self::MechanismMismatch { .. } => {
                Problem::new(StatusCode::UNAUTHORIZED, "Unauthorized", "Authentication failed")
            }
            Self::Forbidden(_) => Problem::new(StatusCode::FORBIDDEN, "Forbidden", "Access denied"),
            Self::Redirect(challenge) => Problem::new(challenge.status, "Redirect", location(challenge)),
            Self::Unhandled(message) => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                message.clone(),
            ),
        }
    }

    fn challenge_data(&self) -> Option<&ChallengeData> {
        match self {
            Self::Unauthenticated(challenge) | Self::Redirect(challenge) => Some(challenge),
            Self::Forbidden(_) | Self::MechanismMismatch { .. } | Self::Unhandled(_) => None,
        }
    }
}

/// RFC 9457 problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl Problem {
    #[must_use]
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_owned(),
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON))],
            Json(self),
        )
            .into_response()
    }
}

/// Application-supplied body for security failures.
///
/// The returned response replaces the default problem document; the status
/// and challenge headers of the failure are applied on top of it.
pub trait FailureHandler: Send + Sync {
    /// `None` keeps the default body.
    fn handle(&self, failure: &SecurityFailure, request: &RequestInfo) -> Option<Response>;
}

/// Build the response of a failure.
///
/// Redirects always carry an empty body. Challenge headers replace any value
/// the handler set, so each appears exactly once.
pub(crate) fn failure_response(
    failure: &SecurityFailure,
    request: &RequestInfo,
    handler: Option<&Arc<dyn FailureHandler>>,
) -> Response {
    let mut response = match failure {
        SecurityFailure::Redirect(_) => ().into_response(),
        _ => handler
            .and_then(|h| h.handle(failure, request))
            .unwrap_or_else(|| failure.problem().into_response()),
    };
    *response.status_mut() = failure.status();
    if let Some(challenge) = failure.challenge_data() {
        for (name, value) in &challenge.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
    response
}
