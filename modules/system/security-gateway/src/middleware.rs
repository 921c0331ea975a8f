//! axum adapter.

use authn_sdk::RequestInfo;
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, Method, StatusCode, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;

use crate::endpoint::ResolvedEndpoint;
use crate::failure::Problem;
use crate::gateway::SecurityGateway;

/// Largest login form body accepted.
const MAX_FORM_BYTES: usize = 16 * 1024;

/// Largest request body bound into permission arguments.
const MAX_BOUND_BODY_BYTES: usize = 64 * 1024;

/// Subject of the client certificate verified by the TLS layer.
///
/// Transports that terminate mutual TLS insert it as a request extension.
#[derive(Debug, Clone)]
pub struct PeerCertificate(pub String);

impl SecurityGateway {
    /// Put every route of `router`, including its fallback, behind the gateway.
    #[must_use]
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(self.clone(), security_middleware))
    }
}

/// Security middleware.
///
/// For each request:
/// 1. Skips CORS preflight requests
/// 2. Answers login form submissions when form authentication is enabled
/// 3. Binds a JSON or urlencoded body when the endpoint check reads arguments
/// 4. Runs the proactive authentication, HTTP permission and endpoint stages
/// 5. Inserts `Arc<RequestSecurity>` for handlers and runs the handler
pub async fn security_middleware(
    State(gateway): State<SecurityGateway>,
    req: Request,
    next: Next,
) -> Response {
    if is_preflight_request(req.method(), req.headers()) {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let mut info =
        RequestInfo::new(parts.method.clone(), parts.uri.path()).with_headers(parts.headers.clone());
    if let Some(query) = parts.uri.query() {
        info = info.with_query(query);
    }
    if let Some(PeerCertificate(subject)) = parts.extensions.get::<PeerCertificate>() {
        info = info.with_peer_certificate(subject.clone());
    }

    if let Some(form) = gateway.login_form(&info).cloned() {
        let fields = match read_form(body).await {
            Ok(fields) => fields,
            Err(response) => return response,
        };
        let security = gateway.secure(info.with_form_fields(fields));
        return security.form_login(&form).await;
    }

    let security = gateway.secure(info);
    let mut args = security.args();
    let body = if security.endpoint().is_some_and(ResolvedEndpoint::reads_arguments) {
        match bind_body(&mut args, &parts.headers, body).await {
            Ok(body) => body,
            Err(response) => return response,
        }
    } else {
        body
    };
    if let Err(failure) = security.admit(&args).await {
        return security
            .reject(&failure)
            .unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    parts.extensions.insert(security.clone());
    let response = next.run(Request::from_parts(parts, body)).await;
    security.mark_response_sent();
    response
}

async fn read_form(body: Body) -> Result<Vec<(String, String)>, Response> {
    let bad_request = |detail: &str| {
        Problem::new(StatusCode::BAD_REQUEST, "Bad Request", detail).into_response()
    };
    let bytes = Limited::new(body, MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|_| bad_request("login form is too large or unreadable"))?
        .to_bytes();
    serde_urlencoded::from_bytes(&bytes).map_err(|_| bad_request("malformed login form"))
}

/// Request bodies bound into permission arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

impl BodyKind {
    fn of(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::Json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else {
            None
        }
    }
}

/// Buffer a JSON or urlencoded body and expose it as `body` in `args`.
///
/// Returns the body to hand on to the endpoint. A body that does not parse
/// is left unbound.
async fn bind_body(args: &mut Value, headers: &HeaderMap, body: Body) -> Result<Body, Response> {
    let Some(kind) = BodyKind::of(headers) else {
        return Ok(body);
    };
    let bytes = Limited::new(body, MAX_BOUND_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                Problem::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", "request body is too large")
            } else {
                Problem::new(StatusCode::BAD_REQUEST, "Bad Request", "request body is unreadable")
            }
            .into_response()
        })?
        .to_bytes();
    let parsed = match kind {
        BodyKind::Json => serde_json::from_slice::<Value>(&bytes).ok(),
        BodyKind::Form => serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
            .ok()
            .map(|fields| Value::Object(fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect())),
    };
    match (parsed, args) {
        (Some(parsed), Value::Object(map)) => {
            map.insert("body".to_owned(), parsed);
        }
        (None, _) => tracing::debug!(?kind, "request body not bound, it does not parse"),
        (Some(_), _) => {}
    }
    Ok(Body::from(bytes))
}

/// Check if this is a CORS preflight request
///
/// Preflight requests are OPTIONS requests with:
/// - Origin header present
/// - Access-Control-Request-Method header present
fn is_preflight_request(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}
