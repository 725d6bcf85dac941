//! Request admission: host pinning, origin trust, credentials and the CSRF
//! session header, plus the CORS headers echoed to trusted origins.
//!
//! Checks run in a fixed order (host, origin, preflight, credentials,
//! session). Every rejection is answered here and never reaches the
//! dispatcher.

use std::net::SocketAddr;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, AUTHORIZATION, AsHeaderName,
    CACHE_CONTROL, CONTENT_TYPE, HOST, ORIGIN, WWW_AUTHENTICATE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tinytorrent_config::{LEGACY_TOKEN_HEADER, ServerOptions};
use tinytorrent_rpc::{RpcError, render_envelope};
use tracing::debug;
use url::Url;

use crate::error::{ServerError, ServerResult};

/// Every spelling of the loopback interface accepted in `Host`.
const LOOPBACK_HOSTS: [&str; 5] = ["127.0.0.1", "localhost", "[::1]", "::1", "0:0:0:0:0:0:0:1"];

/// Headers always allowed on cross-origin RPC calls.
const BASE_ALLOW_HEADERS: [&str; 4] = [
    "Content-Type",
    "X-TT-Auth",
    "X-Transmission-Session-Id",
    "Authorization",
];

const ALLOW_METHODS: &str = "POST, OPTIONS";
const PREFLIGHT_MAX_AGE: &str = "600";
const NO_STORE: &str = "no-store";

/// Normalise a `Host` header: trim, keep bracketed IPv6 literals whole,
/// drop a single `:port` suffix and lowercase.
pub(crate) fn canonicalize_host(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let end = trimmed.find(']').map_or(trimmed.len(), |index| index + 1);
        return trimmed[..end].to_ascii_lowercase();
    }
    let host = match trimmed.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => trimmed,
    };
    host.to_ascii_lowercase()
}

pub(crate) fn is_loopback_host(host: &str) -> bool {
    LOOPBACK_HOSTS.contains(&host)
}

/// Hosts accepted for a listener bound to `bind`.
fn allowed_hosts(bind: SocketAddr) -> Vec<String> {
    let literal = match bind {
        SocketAddr::V4(addr) => addr.ip().to_string(),
        SocketAddr::V6(addr) => format!("[{}]", addr.ip()),
    };
    let canonical = canonicalize_host(&literal);
    let mut hosts = vec![canonical.clone()];
    if is_loopback_host(&canonical) {
        for host in LOOPBACK_HOSTS {
            if !hosts.iter().any(|existing| existing == host) {
                hosts.push(host.to_string());
            }
        }
    }
    hosts
}

fn host_allowed(host: &str, allowed: &[String]) -> bool {
    if host.is_empty() {
        return false;
    }
    if allowed.is_empty() {
        return is_loopback_host(host);
    }
    allowed.iter().any(|candidate| {
        candidate == host || (is_loopback_host(host) && is_loopback_host(candidate))
    })
}

fn origin_host_is_loopback(origin: &str) -> bool {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(canonicalize_host))
        .is_some_and(|host| is_loopback_host(&host))
}

/// `Content-Type, X-TT-Auth, ...` extended by the headers a preflight asked
/// for, deduplicated without regard to case.
fn allow_headers(requested: Option<&str>) -> String {
    let mut names: Vec<String> = BASE_ALLOW_HEADERS.iter().map(ToString::to_string).collect();
    for name in requested.into_iter().flat_map(|list| list.split(',')) {
        let name = name.trim();
        if name.is_empty() || names.iter().any(|known| known.eq_ignore_ascii_case(name)) {
            continue;
        }
        names.push(name.to_string());
    }
    names.join(", ")
}

fn header_str(headers: &HeaderMap, name: impl AsHeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn decode_basic(value: &str) -> Option<String> {
    let payload = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

/// Which endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Rpc,
    WebSocket,
    Other,
}

/// A request answered by the gate instead of a handler.
#[derive(Debug)]
pub(crate) struct Rejection {
    status: StatusCode,
    body: RejectionBody,
    headers: HeaderMap,
}

#[derive(Debug)]
enum RejectionBody {
    Json(&'static str),
    Text(&'static str),
}

impl Rejection {
    fn json(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            body: RejectionBody::Json(message),
            headers: HeaderMap::new(),
        }
    }

    fn text(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            body: RejectionBody::Text(message),
            headers: HeaderMap::new(),
        }
    }

    /// 413 for bodies over the size limit.
    pub(crate) fn payload_too_large() -> Self {
        Self::json(StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
    }

    /// 503 when the event loop is gone.
    pub(crate) fn unavailable() -> Self {
        Self::json(StatusCode::SERVICE_UNAVAILABLE, "server unavailable")
    }

    fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (content_type, body) = match self.body {
            RejectionBody::Json(message) => (
                "application/json",
                render_envelope(&Err(RpcError::new(message)), None),
            ),
            RejectionBody::Text(message) => ("text/plain", message.to_string()),
        };
        let mut response = (self.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
        headers.extend(self.headers);
        response
    }
}

/// Admission rules derived from [`ServerOptions`] and the session token.
#[derive(Debug)]
pub(crate) struct SecurityPolicy {
    allowed_hosts: Vec<String>,
    trusted_origins: Vec<String>,
    basic_credentials: Option<String>,
    basic_realm: String,
    token: Option<String>,
    token_header: HeaderName,
    session_header: HeaderName,
    session_id: String,
}

fn header_name(name: &str) -> ServerResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| ServerError::InvalidHeader {
        name: name.to_string(),
    })
}

impl SecurityPolicy {
    pub(crate) fn new(options: &ServerOptions, session_id: String) -> ServerResult<Self> {
        Ok(Self {
            allowed_hosts: allowed_hosts(options.bind),
            trusted_origins: options.trusted_origins.clone(),
            basic_credentials: options
                .basic_auth
                .as_ref()
                .map(|creds| format!("{}:{}", creds.username, creds.password)),
            basic_realm: options.basic_realm.clone(),
            token: options.token.clone(),
            token_header: header_name(&options.token_header)?,
            session_header: header_name(&options.session_header)?,
            session_id,
        })
    }

    /// Reject requests whose `Host` is missing or not one of ours.
    pub(crate) fn check_host(&self, headers: &HeaderMap, route: Route) -> Result<(), Rejection> {
        let host = header_str(headers, HOST).map(canonicalize_host);
        match host {
            Some(host) if host_allowed(&host, &self.allowed_hosts) => Ok(()),
            host => {
                debug!(host = host.as_deref().unwrap_or("<missing>"), "rejected host header");
                Err(match route {
                    Route::Rpc | Route::WebSocket => {
                        Rejection::json(StatusCode::FORBIDDEN, "invalid host header")
                    }
                    Route::Other => Rejection::text(StatusCode::FORBIDDEN, "forbidden"),
                })
            }
        }
    }

    /// Whether a (possibly absent) `Origin` value is trusted.
    pub(crate) fn origin_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        self.trusted_origins.is_empty()
            || self.trusted_origins.iter().any(|trusted| trusted == origin)
            || origin_host_is_loopback(origin)
    }

    /// Return the origin to echo in CORS headers, or reject an untrusted one.
    pub(crate) fn check_origin(&self, headers: &HeaderMap) -> Result<Option<HeaderValue>, Rejection> {
        let value = headers.get(ORIGIN);
        let text = value.and_then(|value| value.to_str().ok());
        if value.is_some() && text.is_none() {
            debug!("rejected non-ascii origin");
            return Err(self.origin_rejection());
        }
        if !self.origin_allowed(text) {
            debug!(origin = text.unwrap_or_default(), "rejected origin");
            return Err(self.origin_rejection());
        }
        Ok(value.filter(|value| !value.is_empty()).cloned())
    }

    fn origin_rejection(&self) -> Rejection {
        Rejection::json(StatusCode::FORBIDDEN, "origin not allowed")
            .with_headers(self.cors_headers(None, None))
    }

    /// Whether the request carries acceptable credentials. `query_token` is
    /// the `?token=` value of a WebSocket upgrade.
    pub(crate) fn authorized(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        if self.basic_credentials.is_none() && self.token.is_none() {
            return true;
        }
        let authorization = header_str(headers, AUTHORIZATION);
        if let Some(token) = self.token.as_deref() {
            let presented = [
                query_token,
                header_str(headers, &self.token_header),
                header_str(headers, LEGACY_TOKEN_HEADER),
                authorization
                    .and_then(|value| value.strip_prefix("Bearer "))
                    .filter(|value| !value.is_empty()),
            ];
            if presented.into_iter().flatten().any(|candidate| candidate == token) {
                return true;
            }
        }
        match (&self.basic_credentials, authorization.and_then(decode_basic)) {
            (Some(expected), Some(presented)) => *expected == presented,
            _ => false,
        }
    }

    /// 401 carrying a Basic challenge when Basic credentials are configured.
    pub(crate) fn unauthorized(&self, cors: HeaderMap) -> Rejection {
        let mut rejection =
            Rejection::text(StatusCode::UNAUTHORIZED, "unauthorized").with_headers(cors);
        if self.basic_credentials.is_some() {
            let challenge = format!("Basic realm=\"{}\"", self.basic_realm);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                rejection.headers.insert(WWW_AUTHENTICATE, value);
            }
        }
        rejection
    }

    /// 403 for a WebSocket upgrade without a valid token.
    pub(crate) fn invalid_token() -> Rejection {
        Rejection::json(StatusCode::FORBIDDEN, "invalid token")
    }

    /// Require the session header to equal the session token; the 409 carries
    /// the expected value so clients can retry.
    pub(crate) fn check_session(
        &self,
        headers: &HeaderMap,
        cors: HeaderMap,
    ) -> Result<(), Rejection> {
        let presented = headers.get(&self.session_header);
        if presented.is_some_and(|value| value.as_bytes() == self.session_id.as_bytes()) {
            return Ok(());
        }
        debug!("rpc request without a valid session id");
        let mut rejection =
            Rejection::json(StatusCode::CONFLICT, "session id required").with_headers(cors);
        if let Ok(value) = HeaderValue::from_str(&self.session_id) {
            rejection.headers.insert(self.session_header.clone(), value);
        }
        Err(rejection)
    }

    /// CORS and caching headers attached to every RPC response.
    pub(crate) fn cors_headers(
        &self,
        origin: Option<&HeaderValue>,
        requested: Option<&str>,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
        let Some(origin) = origin else {
            return headers;
        };
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        let allowed = HeaderValue::from_str(&allow_headers(requested))
            .or_else(|_| HeaderValue::from_str(&allow_headers(None)));
        if let Ok(allowed) = allowed {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allowed);
        }
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from(self.session_header.clone()),
        );
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
        headers
    }

    /// 204 answer to an RPC preflight.
    pub(crate) fn preflight(
        &self,
        origin: Option<&HeaderValue>,
        requested: Option<&str>,
    ) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.extend(self.cors_headers(origin, requested));
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinytorrent_config::BasicCredentials;

    fn policy(options: &ServerOptions) -> SecurityPolicy {
        SecurityPolicy::new(options, "0123456789abcdef0123456789abcdef".into()).expect("policy")
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).expect("value"));
        }
        map
    }

    #[test]
    fn hosts_are_canonicalized() {
        assert_eq!(canonicalize_host("  LocalHost:9091 "), "localhost");
        assert_eq!(canonicalize_host("[::1]:9091"), "[::1]");
        assert_eq!(canonicalize_host("[::1"), "[::1");
        assert_eq!(canonicalize_host("::1"), "::1");
        assert_eq!(canonicalize_host("127.0.0.1"), "127.0.0.1");
        assert_eq!(canonicalize_host(""), "");
    }

    #[test]
    fn loopback_bind_accepts_every_loopback_spelling() {
        let hosts = allowed_hosts(SocketAddr::from(([127, 0, 0, 1], 0)));
        for host in ["127.0.0.1", "localhost", "[::1]", "::1"] {
            assert!(host_allowed(host, &hosts), "{host}");
        }
        assert!(!host_allowed("evil.example", &hosts));
        assert!(!host_allowed("", &hosts));

        let hosts = allowed_hosts("192.168.1.4:9091".parse().expect("addr"));
        assert_eq!(hosts, vec!["192.168.1.4".to_string()]);
        assert!(!host_allowed("localhost", &hosts));
        assert!(host_allowed("localhost", &[]));
    }

    #[test]
    fn host_rejections_depend_on_route() {
        let policy = policy(&ServerOptions::default());
        assert!(policy.check_host(&headers(&[("host", "localhost:1")]), Route::Rpc).is_ok());
        let rejection = policy
            .check_host(&headers(&[("host", "evil.example")]), Route::Rpc)
            .expect_err("spoofed host");
        assert_eq!(rejection.status, StatusCode::FORBIDDEN);
        assert!(matches!(rejection.body, RejectionBody::Json("invalid host header")));
        let rejection = policy
            .check_host(&HeaderMap::new(), Route::Other)
            .expect_err("missing host");
        assert!(matches!(rejection.body, RejectionBody::Text("forbidden")));
    }

    #[test]
    fn origins_follow_the_trust_list() {
        let policy = policy(&ServerOptions::default());
        assert!(policy.origin_allowed(None));
        assert!(policy.origin_allowed(Some("tt://app")));
        assert!(policy.origin_allowed(Some("http://127.0.0.1:5173")));
        assert!(policy.origin_allowed(Some("http://[::1]:8080")));
        assert!(!policy.origin_allowed(Some("https://evil.example")));
        assert!(!policy.origin_allowed(Some("null")));

        let open = SecurityPolicy::new(
            &ServerOptions {
                trusted_origins: Vec::new(),
                ..ServerOptions::default()
            },
            String::new(),
        )
        .expect("policy");
        assert!(open.origin_allowed(Some("https://evil.example")));
    }

    #[test]
    fn credentials_accept_every_token_channel() {
        let options = ServerOptions {
            token: Some("secret".into()),
            basic_auth: Some(BasicCredentials {
                username: "user".into(),
                password: "pass".into(),
            }),
            ..ServerOptions::default()
        };
        let policy = policy(&options);
        assert!(!policy.authorized(&HeaderMap::new(), None));
        assert!(policy.authorized(&HeaderMap::new(), Some("secret")));
        assert!(policy.authorized(&headers(&[("x-tt-auth", "secret")]), None));
        assert!(policy.authorized(&headers(&[("x-tinytorrent-token", "secret")]), None));
        assert!(policy.authorized(&headers(&[("authorization", "Bearer secret")]), None));
        assert!(!policy.authorized(&headers(&[("authorization", "Bearer nope")]), None));
        let basic = format!("Basic {}", STANDARD.encode("user:pass"));
        assert!(policy.authorized(&headers(&[("authorization", &basic)]), None));
        let wrong = format!("Basic {}", STANDARD.encode("user:nope"));
        assert!(!policy.authorized(&headers(&[("authorization", &wrong)]), None));

        let rejection = policy.unauthorized(HeaderMap::new());
        assert_eq!(rejection.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            rejection.headers.get(WWW_AUTHENTICATE).and_then(|v| v.to_str().ok()),
            Some("Basic realm=\"TinyTorrent RPC\"")
        );
    }

    #[test]
    fn open_policy_needs_no_credentials() {
        let policy = policy(&ServerOptions::default());
        assert!(policy.authorized(&HeaderMap::new(), None));
        assert!(policy.unauthorized(HeaderMap::new()).headers.get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn session_conflict_carries_expected_token() {
        let policy = policy(&ServerOptions::default());
        let rejection = policy
            .check_session(&HeaderMap::new(), HeaderMap::new())
            .expect_err("missing session");
        assert_eq!(rejection.status, StatusCode::CONFLICT);
        assert_eq!(
            rejection.headers.get("x-transmission-session-id").and_then(|v| v.to_str().ok()),
            Some("0123456789abcdef0123456789abcdef")
        );
        let ok = headers(&[("x-transmission-session-id", "0123456789abcdef0123456789abcdef")]);
        assert!(policy.check_session(&ok, HeaderMap::new()).is_ok());
    }

    #[test]
    fn cors_headers_merge_requested_names() {
        assert_eq!(
            allow_headers(Some("content-type, X-Custom ,, x-custom")),
            "Content-Type, X-TT-Auth, X-Transmission-Session-Id, Authorization, X-Custom"
        );
        let policy = policy(&ServerOptions::default());
        let origin = HeaderValue::from_static("tt://app");
        let cors = policy.cors_headers(Some(&origin), None);
        assert_eq!(cors.get(ACCESS_CONTROL_ALLOW_ORIGIN), Some(&origin));
        assert_eq!(
            cors.get(ACCESS_CONTROL_ALLOW_METHODS).and_then(|v| v.to_str().ok()),
            Some("POST, OPTIONS")
        );
        let bare = policy.cors_headers(None, None);
        assert!(bare.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(bare.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()), Some("no-store"));

        let response = policy.preflight(Some(&origin), Some("X-Extra"));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_MAX_AGE).and_then(|v| v.to_str().ok()),
            Some("600")
        );
    }
}
