//! Per-request security pipeline.
//!
//! One [`RequestSecurity`] lives for one HTTP exchange. It resolves the
//! identity at most once, runs the HTTP permission stages and the endpoint
//! check, fires the lifecycle events and builds failure responses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use authn::mechanism::FormAuthenticationMechanism;
use authn_sdk::{AuthNError, ChallengeData, HttpAuthenticationMechanism, IdentityProviderManager, RequestInfo};
use authz::path_matcher::normalize_path;
use authz::{AppliesTo, PolicyFailure};
use authz_sdk::{AuthZError, IdentitySource, SecuredMethod, SecurityCheck};
use axum::response::{IntoResponse, Response};
use http::header;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use warden_security::SecurityIdentity;

use crate::endpoint::ResolvedEndpoint;
use crate::events::{HTTP_POLICY_CHECK_PREFIX, SecurityEvent};
use crate::failure::{SecurityFailure, failure_response};
use crate::gateway::Engine;

/// Mechanisms allowed to authenticate a request.
enum Selection {
    /// Tried in order; the first one is asked for the challenge.
    Mechanisms(Vec<Arc<dyn HttpAuthenticationMechanism>>),
    /// An HTTP permission and the endpoint name different mechanisms.
    Mismatch { pinned: String, selected: String },
}

/// Security state of one request.
///
/// Handlers reach it through `Extension<Arc<RequestSecurity>>` to run
/// further checks on the same identity:
///
/// ```ignore
/// async fn create(Extension(security): Extension<Arc<RequestSecurity>>) -> Response {
///     let method = SecuredMethod::new("OrderService#create", SecurityCheck::roles(["writer"]));
///     if let Err(failure) = security.check(&method, &security.args()).await {
///         return security.reject(&failure).unwrap_or_default();
///     }
///     // ...
/// }
/// ```
pub struct RequestSecurity {
    engine: Arc<Engine>,
    request: RequestInfo,
    endpoint: Option<ResolvedEndpoint>,
    path_params: Vec<(String, String)>,
    selection: Selection,
    identity: OnceCell<Result<SecurityIdentity, AuthNError>>,
    augmented: RwLock<Option<SecurityIdentity>>,
    response_sent: AtomicBool,
}

impl RequestSecurity {
    pub(crate) fn new(engine: Arc<Engine>, request: RequestInfo) -> Self {
        let path = normalize_path(request.path());
        let (endpoint, path_params) = match engine.endpoints.find(request.method(), &path) {
            Some(found) => (Some(found.endpoint.clone()), found.params),
            None => (None, Vec::new()),
        };
        let selection = select_mechanisms(&engine, &request, endpoint.as_ref());
        Self {
            engine,
            request,
            endpoint,
            path_params,
            selection,
            identity: OnceCell::new(),
            augmented: RwLock::new(None),
            response_sent: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Endpoint the request is routed to, if registered.
    #[must_use]
    pub fn endpoint(&self) -> Option<&ResolvedEndpoint> {
        self.endpoint.as_ref()
    }

    /// Identity resolved so far, including any policy augmentation.
    #[must_use]
    pub fn current_identity(&self) -> Option<SecurityIdentity> {
        self.resolved()
    }

    /// Call arguments available to permission bindings.
    ///
    /// Query and path parameters at the top level (path parameters win), plus
    /// `headers` and `cookies` objects. The axum middleware adds the parsed
    /// request `body` for endpoints whose check reads arguments.
    #[must_use]
    pub fn args(&self) -> Value {
        let mut args = Map::new();
        let query: Vec<(String, String)> = self
            .request
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        for (name, value) in query.into_iter().chain(self.path_params.iter().cloned()) {
            args.insert(name, Value::String(value));
        }

        let mut headers = Map::new();
        for (name, value) in self.request.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str())
                .or_insert_with(|| Value::String(value.to_owned()));
        }
        let cookies: Map<String, Value> = self
            .request
            .cookies()
            .map(|(name, value)| (name.to_owned(), Value::String(value.to_owned())))
            .collect();
        args.insert("headers".to_owned(), Value::Object(headers));
        args.insert("cookies".to_owned(), Value::Object(cookies));
        Value::Object(args)
    }

    /// Run every stage that must pass before the endpoint is invoked.
    ///
    /// In proactive mode the identity is resolved first, so invalid
    /// credentials fail the request even on paths that need none.
    ///
    /// # Errors
    ///
    /// Returns the first [`SecurityFailure`]; later stages are skipped.
    pub async fn admit(&self, args: &Value) -> Result<(), SecurityFailure> {
        if self.engine.proactive {
            self.identity()
                .await
                .map_err(|e| self.authentication_failure(&e))?;
        }
        self.policy_stage(AppliesTo::All).await?;
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };
        self.policy_stage(AppliesTo::Jaxrs).await?;
        match &endpoint.check {
            Some(check) => self.authorize(&endpoint.name, check, args).await,
            None => Ok(()),
        }
    }

    /// Enforce a further check on the request identity.
    ///
    /// Reuses the identity resolved for the request and fires its own
    /// authorization event.
    ///
    /// # Errors
    ///
    /// Returns a [`SecurityFailure`] if the check does not pass.
    pub async fn check(&self, method: &SecuredMethod, args: &Value) -> Result<(), SecurityFailure> {
        self.authorize(&method.name, &method.check, args).await
    }

    /// Response for `failure`, unless a response was already sent.
    #[must_use]
    pub fn reject(&self, failure: &SecurityFailure) -> Option<Response> {
        if self.response_sent.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                request_id = %self.request.id(),
                failure = %failure,
                "response already sent, dropping security failure response"
            );
            return None;
        }
        Some(failure_response(
            failure,
            &self.request,
            self.engine.failure_handler.as_ref(),
        ))
    }

    /// Record that the response has started.
    pub fn mark_response_sent(&self) {
        self.response_sent.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_response_sent(&self) -> bool {
        self.response_sent.load(Ordering::SeqCst)
    }

    /// Handle a login form submission.
    pub(crate) async fn form_login(&self, form: &FormAuthenticationMechanism) -> Response {
        match form.login(&self.request, &*self.engine.providers).await {
            Ok(login) => {
                self.fire_authenticated(&login.identity, form.name());
                let mut response = ().into_response();
                *response.status_mut() = login.redirect.status;
                response.headers_mut().extend(login.redirect.headers);
                response.headers_mut().insert(header::SET_COOKIE, login.cookie);
                self.mark_response_sent();
                response
            }
            Err(error) => {
                self.fire_authentication_failed(Some(form.name()), &error);
                let failure = if error.is_unauthorized() {
                    SecurityFailure::challenge(form.login_failure())
                } else {
                    SecurityFailure::Unhandled(error.to_string())
                };
                self.reject(&failure).unwrap_or_default()
            }
        }
    }

    async fn policy_stage(&self, stage: AppliesTo) -> Result<(), SecurityFailure> {
        match self.engine.policies.evaluate(&self.request, stage, self).await {
            Ok(outcome) => {
                if let Some(identity) = outcome.identity {
                    *self.augmented.write() = Some(identity);
                }
                if !outcome.policies.is_empty() {
                    self.engine.events.fire(&SecurityEvent::AuthorizationSuccess {
                        request_id: self.request.id(),
                        identity: self.resolved().unwrap_or_else(SecurityIdentity::anonymous),
                        check: format!("{HTTP_POLICY_CHECK_PREFIX}{}", outcome.policies.join(",")),
                    });
                }
                Ok(())
            }
            Err(PolicyFailure { policy, error }) => {
                // Authentication failures already fired their own event.
                if !matches!(error, AuthZError::Authentication(_)) {
                    self.fire_authorization_failed(
                        format!("{HTTP_POLICY_CHECK_PREFIX}{policy}"),
                        &error,
                    );
                }
                Err(self.authorization_failure(error))
            }
        }
    }

    async fn authorize(&self, name: &str, check: &SecurityCheck, args: &Value) -> Result<(), SecurityFailure> {
        let identity = if check.allows_anonymous() {
            self.resolved().unwrap_or_else(SecurityIdentity::anonymous)
        } else {
            self.identity()
                .await
                .map_err(|e| self.authentication_failure(&e))?
        };
        match self.engine.authorization.authorize(&identity, check, args).await {
            Ok(()) => {
                self.engine.events.fire(&SecurityEvent::AuthorizationSuccess {
                    request_id: self.request.id(),
                    identity,
                    check: name.to_owned(),
                });
                Ok(())
            }
            Err(error) => {
                self.fire_authorization_failed(name.to_owned(), &error);
                Err(self.authorization_failure(error))
            }
        }
    }

    async fn resolve_identity(&self) -> Result<SecurityIdentity, AuthNError> {
        self.identity
            .get_or_init(|| self.authenticate())
            .await
            .clone()
    }

    /// The single authentication attempt of the request.
    async fn authenticate(&self) -> Result<SecurityIdentity, AuthNError> {
        let mechanisms = match &self.selection {
            Selection::Mechanisms(mechanisms) => mechanisms,
            Selection::Mismatch { pinned, selected } => {
                let error = AuthNError::Unauthorized(format!(
                    "mechanism '{pinned}' required by HTTP permission conflicts with endpoint mechanism '{selected}'"
                ));
                self.fire_authentication_failed(Some(pinned), &error);
                return Err(error);
            }
        };
        for mechanism in mechanisms {
            match mechanism.authenticate(&self.request, &*self.engine.providers).await {
                Ok(Some(identity)) => {
                    let identity = SecurityIdentity::builder_from(&identity)
                        .request_id(self.request.id())
                        .auth_mechanism(mechanism.name())
                        .build();
                    self.fire_authenticated(&identity, mechanism.name());
                    return Ok(identity);
                }
                Ok(None) => {}
                Err(error) => {
                    self.fire_authentication_failed(Some(mechanism.name()), &error);
                    return Err(error);
                }
            }
        }
        tracing::debug!(request_id = %self.request.id(), "no credentials, continuing as anonymous");
        self.engine
            .providers
            .augment(SecurityIdentity::anonymous(), &self.request)
            .await
            .inspect_err(|error| self.fire_authentication_failed(None, error))
    }

    fn challenge(&self) -> ChallengeData {
        match &self.selection {
            Selection::Mechanisms(mechanisms) => mechanisms
                .first()
                .map_or_else(ChallengeData::unauthorized, |m| m.challenge(&self.request)),
            Selection::Mismatch { .. } => ChallengeData::unauthorized(),
        }
    }

    fn authentication_failure(&self, error: &AuthNError) -> SecurityFailure {
        match (&self.selection, error) {
            (Selection::Mismatch { pinned, selected }, _) => SecurityFailure::MechanismMismatch {
                pinned: pinned.clone(),
                selected: selected.clone(),
            },
            (_, AuthNError::Unauthorized(_)) => SecurityFailure::challenge(self.challenge()),
            (_, other) => SecurityFailure::Unhandled(other.to_string()),
        }
    }

    fn authorization_failure(&self, error: AuthZError) -> SecurityFailure {
        match error {
            AuthZError::Unauthenticated => SecurityFailure::challenge(self.challenge()),
            AuthZError::Forbidden(reason) => SecurityFailure::Forbidden(reason),
            AuthZError::Authentication(error) => self.authentication_failure(&error),
            other @ (AuthZError::Checker { .. } | AuthZError::Misconfigured(_)) => {
                tracing::error!(request_id = %self.request.id(), error = ?other, "authorization failed");
                SecurityFailure::Unhandled(other.to_string())
            }
        }
    }

    fn fire_authenticated(&self, identity: &SecurityIdentity, mechanism: &str) {
        tracing::debug!(
            request_id = %self.request.id(),
            principal = %identity.principal_name(),
            mechanism,
            "authentication succeeded"
        );
        self.engine.events.fire(&SecurityEvent::AuthenticationSuccess {
            request_id: self.request.id(),
            identity: identity.clone(),
            mechanism: mechanism.to_owned(),
        });
    }

    fn fire_authentication_failed(&self, mechanism: Option<&str>, error: &AuthNError) {
        log_authn_error(self, mechanism, error);
        self.engine.events.fire(&SecurityEvent::AuthenticationFailure {
            request_id: self.request.id(),
            mechanism: mechanism.map(str::to_owned),
            error: error.to_string(),
        });
    }

    fn fire_authorization_failed(&self, check: String, error: &AuthZError) {
        tracing::debug!(request_id = %self.request.id(), check = %check, error = %error, "authorization denied");
        self.engine.events.fire(&SecurityEvent::AuthorizationFailure {
            request_id: self.request.id(),
            identity: self.resolved().filter(|identity| !identity.is_anonymous()),
            check,
            error: error.to_string(),
        });
    }
}

#[async_trait]
impl IdentitySource for RequestSecurity {
    async fn identity(&self) -> Result<SecurityIdentity, AuthNError> {
        let augmented = self.augmented.read().clone();
        match augmented {
            Some(identity) => Ok(identity),
            None => self.resolve_identity().await,
        }
    }

    fn resolved(&self) -> Option<SecurityIdentity> {
        self.augmented.read().clone().or_else(|| {
            self.identity
                .get()
                .and_then(|result| result.as_ref().ok().cloned())
        })
    }
}

/// Pick the mechanisms for a request.
///
/// A mechanism pinned by an HTTP permission must agree with the one the
/// endpoint names. Without either, the configured default applies, and
/// without a default every mechanism is tried by descending priority.
fn select_mechanisms(engine: &Engine, request: &RequestInfo, endpoint: Option<&ResolvedEndpoint>) -> Selection {
    let policies = &engine.policies;
    let pinned = policies
        .mechanism_pin(request.path(), request.method(), AppliesTo::All)
        .or_else(|| {
            endpoint.and_then(|_| policies.mechanism_pin(request.path(), request.method(), AppliesTo::Jaxrs))
        });
    let annotated = endpoint.and_then(|e| e.mechanism.as_deref());

    let chosen = match (pinned, annotated) {
        (Some(pinned), Some(selected)) if pinned != selected => {
            tracing::debug!(pinned, selected, path = %request.path(), "mechanism mismatch");
            return Selection::Mismatch {
                pinned: pinned.to_owned(),
                selected: selected.to_owned(),
            };
        }
        (Some(name), _) | (None, Some(name)) => Some(name),
        (None, None) => engine.default_mechanism.as_deref(),
    };
    let mechanisms = match chosen {
        Some(name) => engine
            .mechanisms
            .iter()
            .filter(|m| m.name() == name)
            .cloned()
            .collect(),
        None => engine.mechanisms.clone(),
    };
    tracing::debug!(mechanism = ?chosen, path = %request.path(), "mechanisms selected");
    Selection::Mechanisms(mechanisms)
}

/// Log authentication errors at appropriate levels.
///
/// Cognitive complexity is inflated by tracing macro expansion.
#[allow(clippy::cognitive_complexity)]
fn log_authn_error(security: &RequestSecurity, mechanism: Option<&str>, error: &AuthNError) {
    let request_id = security.request.id();
    match error {
        AuthNError::Unauthorized(msg) => {
            tracing::debug!(%request_id, ?mechanism, "AuthN rejected: {msg}");
        }
        AuthNError::NoProviderAvailable(request_type) => {
            tracing::error!(%request_id, ?mechanism, "No identity provider for {request_type:?} requests");
        }
        AuthNError::ServiceUnavailable(msg) => {
            tracing::error!(%request_id, ?mechanism, "AuthN service unavailable: {msg}");
        }
        AuthNError::Internal(msg) => {
            tracing::error!(%request_id, ?mechanism, "AuthN internal error: {msg}");
        }
    }
}
