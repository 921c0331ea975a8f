//! Transport-agnostic view of an inbound request.

use cookie::Cookie;
use http::{HeaderMap, Method, header};
use warden_security::RequestId;

/// Request facts the security stages consume.
///
/// Built once per exchange by the transport adapter and shared by reference
/// (`Arc<RequestInfo>`) through authentication, augmentation and authorization.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    id: RequestId,
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    form_fields: Vec<(String, String)>,
    peer_certificate: Option<String>,
}

impl RequestInfo {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            form_fields: Vec::new(),
            peer_certificate: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.cookies = parse_cookies(&headers);
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_form_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.form_fields = fields;
        self
    }

    /// Subject DN of the client certificate verified by the transport.
    #[must_use]
    pub fn with_peer_certificate(mut self, subject: impl Into<String>) -> Self {
        self.peer_certificate = Some(subject.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a cookie from the `Cookie` headers, without surrounding quotes.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v.as_str()))
    }

    /// Every request cookie, in header order.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form_fields
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v.as_str()))
    }

    #[must_use]
    pub fn peer_certificate(&self) -> Option<&str> {
        self.peer_certificate.as_deref()
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .map(|c| (c.name().to_owned(), c.value_trimmed().to_owned()))
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn request_with_headers(pairs: &[(&'static str, &'static str)]) -> RequestInfo {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, HeaderValue::from_static(v));
        }
        RequestInfo::new(Method::GET, "/x").with_headers(headers)
    }

    #[test]
    fn reads_cookie_across_headers() {
        let req = request_with_headers(&[("cookie", "a=1; b=2"), ("cookie", "c=3")]);
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
        assert_eq!(req.cookie("c"), Some("3"));
        assert_eq!(req.cookie("d"), None);
    }

    #[test]
    fn quoted_cookie_value_is_unquoted() {
        let req = request_with_headers(&[("cookie", "warden-credential=\"admin:ab12\"; theme=dark")]);
        assert_eq!(req.cookie("warden-credential"), Some("admin:ab12"));
        let all: Vec<(&str, &str)> = req.cookies().collect();
        assert_eq!(all, vec![("warden-credential", "admin:ab12"), ("theme", "dark")]);
    }

    #[test]
    fn reads_header_and_form_field() {
        let req = request_with_headers(&[("fail-augmentation", "true")])
            .with_form_fields(vec![("j_username".to_owned(), "admin".to_owned())]);
        assert_eq!(req.header("fail-augmentation"), Some("true"));
        assert_eq!(req.form_field("j_username"), Some("admin"));
        assert_eq!(req.form_field("j_password"), None);
    }

    #[test]
    fn each_request_gets_its_own_id() {
        let a = RequestInfo::new(Method::GET, "/a");
        let b = RequestInfo::new(Method::GET, "/a");
        assert_ne!(a.id(), b.id());
    }
}
