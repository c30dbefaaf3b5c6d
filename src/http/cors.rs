//! CORS preflight evaluation.
//!
//! # Responsibilities
//! - Inspect `Origin` / `Access-Control-Request-*` headers
//! - Decide whether the request gets a CORS response
//! - Write `Access-Control-Allow-*` headers onto the response
//!
//! # Design Decisions
//! - Origin is echoed back verbatim, never `*`
//! - Requested headers are echoed back verbatim when present
//! - Policy is built once and shared read-only

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue};

pub const CORS_HEADER_ORIGIN: &str = "Origin";
pub const CORS_HEADER_REQUEST_METHOD: &str = "Access-Control-Request-Method";
pub const CORS_HEADER_REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
pub const CORS_HEADER_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const CORS_HEADER_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const CORS_HEADER_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";

/// Methods the gateway answers CORS requests for, in header order.
pub const CORS_ALLOWED_METHODS: [&str; 5] = ["DELETE", "GET", "PATCH", "POST", "PUT"];

/// Outcome of inspecting a request's CORS headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsDecision {
    pub origin: String,
    pub requested_method: Option<String>,
    pub requested_headers: Option<String>,
    pub allowed: bool,
}

/// Immutable CORS policy shared by all requests.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_methods: &'static [&'static str],
    allow_methods_value: HeaderValue,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_methods: &CORS_ALLOWED_METHODS,
            allow_methods_value: allow_methods_value(&CORS_ALLOWED_METHODS),
        }
    }
}

/// Comma-joined `Access-Control-Allow-Methods` value for a method set.
fn allow_methods_value(methods: &[&str]) -> HeaderValue {
    HeaderValue::from_str(&methods.join(",")).unwrap_or_else(|_| HeaderValue::from_static(""))
}

impl CorsPolicy {
    /// Decide whether a request with these headers gets a CORS response.
    ///
    /// Empty strings are treated the same as absent headers.
    pub fn evaluate(
        &self,
        origin: Option<&str>,
        request_method: Option<&str>,
        request_headers: Option<&str>,
    ) -> CorsDecision {
        let origin = origin.unwrap_or_default().to_string();
        let requested_method = request_method.filter(|m| !m.is_empty()).map(str::to_string);
        let requested_headers = request_headers.filter(|h| !h.is_empty()).map(str::to_string);

        let method_ok = match &requested_method {
            None => true,
            Some(m) => self.is_allowed_method(m),
        };

        CorsDecision {
            allowed: !origin.is_empty() && method_ok,
            origin,
            requested_method,
            requested_headers,
        }
    }

    /// Evaluate straight from inbound request headers.
    pub fn evaluate_headers(&self, headers: &HeaderMap) -> CorsDecision {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        self.evaluate(
            get(CORS_HEADER_ORIGIN),
            get(CORS_HEADER_REQUEST_METHOD),
            get(CORS_HEADER_REQUEST_HEADERS),
        )
    }

    /// Add CORS headers to the response, if the decision allows it.
    pub fn apply(&self, decision: &CorsDecision, headers: &mut HeaderMap) {
        if !decision.allowed {
            return;
        }

        match HeaderValue::from_str(&decision.origin) {
            Ok(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            Err(_) => {
                tracing::warn!(origin = %decision.origin, "Origin not representable as header value");
                return;
            }
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods_value.clone());

        if let Some(requested) = &decision.requested_headers {
            if let Ok(value) = HeaderValue::from_str(requested) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value);
            }
        }
    }

    fn is_allowed_method(&self, method: &str) -> bool {
        let upper = method.to_ascii_uppercase();
        self.allowed_methods.iter().any(|m| *m == upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_rule() {
        let policy = CorsPolicy::default();
        let cases = [
            (Some("http://a.test"), None, true),
            (Some("http://a.test"), Some(""), true),
            (Some("http://a.test"), Some("get"), true),
            (Some("http://a.test"), Some("Patch"), true),
            (Some("http://a.test"), Some("OPTIONS"), false),
            (Some("http://a.test"), Some("HEAD"), false),
            (Some(""), Some("GET"), false),
            (None, None, false),
        ];
        for (origin, method, expected) in cases {
            let decision = policy.evaluate(origin, method, None);
            assert_eq!(decision.allowed, expected, "origin={:?} method={:?}", origin, method);
        }
    }

    #[test]
    fn test_apply_sets_headers() {
        let policy = CorsPolicy::default();
        let decision = policy.evaluate(Some("http://localhost:3000"), Some("post"), Some("content-type, x-foo"));
        let mut headers = HeaderMap::new();
        policy.apply(&decision, &mut headers);

        assert_eq!(headers[CORS_HEADER_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[CORS_HEADER_ALLOW_METHODS], "DELETE,GET,PATCH,POST,PUT");
        assert_eq!(headers[CORS_HEADER_ALLOW_HEADERS], "content-type, x-foo");
    }

    #[test]
    fn test_apply_without_requested_headers() {
        let policy = CorsPolicy::default();
        let decision = policy.evaluate(Some("http://localhost:3000"), None, None);
        let mut headers = HeaderMap::new();
        policy.apply(&decision, &mut headers);

        assert!(headers.contains_key(CORS_HEADER_ALLOW_ORIGIN));
        assert!(!headers.contains_key(CORS_HEADER_ALLOW_HEADERS));
    }

    #[test]
    fn test_apply_disallowed_is_noop() {
        let policy = CorsPolicy::default();
        let decision = policy.evaluate(Some("http://localhost:3000"), Some("TRACE"), Some("x-foo"));
        let mut headers = HeaderMap::new();
        headers.insert("x-existing", HeaderValue::from_static("1"));
        let before = headers.clone();

        policy.apply(&decision, &mut headers);
        assert_eq!(headers, before);
    }

    #[test]
    fn test_allow_methods_header_matches_method_set() {
        let policy = CorsPolicy::default();
        let decision = policy.evaluate(Some("http://localhost:3000"), Some("GET"), None);
        let mut headers = HeaderMap::new();
        policy.apply(&decision, &mut headers);

        let advertised: Vec<&str> = headers[CORS_HEADER_ALLOW_METHODS].to_str().unwrap().split(',').collect();
        assert_eq!(advertised, CORS_ALLOWED_METHODS);
        assert_eq!(headers[CORS_HEADER_ALLOW_METHODS], "DELETE,GET,PATCH,POST,PUT");
    }

    #[test]
    fn test_evaluate_headers() {
        let policy = CorsPolicy::default();
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://app.test"));
        headers.insert("access-control-request-method", HeaderValue::from_static("DELETE"));

        let decision = policy.evaluate_headers(&headers);
        assert!(decision.allowed);
        assert_eq!(decision.origin, "https://app.test");
        assert_eq!(decision.requested_method.as_deref(), Some("DELETE"));
        assert_eq!(decision.requested_headers, None);
    }
}
