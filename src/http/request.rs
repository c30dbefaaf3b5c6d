//! Request normalization.
//!
//! # Responsibilities
//! - Buffer the request body once into an owned byte buffer
//! - Strip the gateway prefix from the path
//! - Parse the JSON body, unwrapping single-element batch requests
//! - Flag JSON-RPC requests (path `rpc`)
//!
//! # Design Decisions
//! - The raw request is kept alongside the normalized one so `copy()`
//!   re-parses from scratch instead of cloning parsed state
//! - Body views are fresh `Body` values over the shared `Bytes`; reading one
//!   never drains another
//! - Batches with more than one element are served from the first element
//!   with a warning, never rejected

use axum::body::{Body, Bytes};
use serde_json::{Map, Value};
use thiserror::Error;

/// Path prefix every gateway request carries.
pub const API_PREFIX: &str = "/_ah/api/";

/// Canonical path of the JSON-RPC transport.
pub const RPC_PATH: &str = "rpc";

/// Reasons a raw request cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    #[error("Problem reading request body: {0}")]
    UnreadableBody(String),

    #[error("Problem unmarshalling request body: {0}")]
    MalformedBody(String),

    #[error("Batch request has zero parts")]
    EmptyBatch,

    #[error("JSON request body must be a map: {0}")]
    BodyNotObject(String),
}

impl NormalizeError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "invalid_path",
            Self::UnreadableBody(_) => "unreadable_body",
            Self::MalformedBody(_) => "malformed_body",
            Self::EmptyBatch => "empty_batch",
            Self::BodyNotObject(_) => "body_not_object",
        }
    }
}

/// The request exactly as received: path, query and buffered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub path: String,
    pub query: Option<String>,
    body: Bytes,
}

impl RawRequest {
    pub fn new(path: impl Into<String>, query: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            query,
            body: body.into(),
        }
    }

    /// Read a streaming body into memory, at most `limit` bytes.
    pub async fn buffer(
        path: impl Into<String>,
        query: Option<String>,
        body: Body,
        limit: usize,
    ) -> Result<Self, NormalizeError> {
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| NormalizeError::UnreadableBody(e.to_string()))?;
        Ok(Self::new(path, query, bytes))
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// A fresh readable view of the buffered body.
    pub fn body(&self) -> Body {
        Body::from(self.body.clone())
    }
}

/// A gateway request in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    /// Path with the gateway prefix removed.
    pub path: String,
    pub query: Option<String>,
    pub body_json: Map<String, Value>,
    pub is_batch: bool,
    pub request_id: String,
    /// Canonical body bytes handed downstream (batch wrapper removed).
    body: Bytes,
    raw: RawRequest,
}

impl NormalizedRequest {
    /// Re-derive an independent request from the same raw input.
    pub fn copy(&self) -> Result<Self, NormalizeError> {
        let mut copy = normalize_raw(self.raw.clone())?;
        copy.request_id = self.request_id.clone();
        Ok(copy)
    }

    /// JSON-RPC requests are all sent to `/_ah/api/rpc`, with API name,
    /// version and method carried in the body.
    pub fn is_rpc(&self) -> bool {
        self.path == RPC_PATH
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// The JSON-RPC `id` member, if the body carried one.
    pub fn rpc_id(&self) -> Option<Value> {
        self.body_json.get("id").cloned()
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// A fresh readable view of the canonical body.
    pub fn body(&self) -> Body {
        Body::from(self.body.clone())
    }

    pub fn raw(&self) -> &RawRequest {
        &self.raw
    }
}

/// Normalize a path and body into a canonical request.
pub fn normalize(raw_path: &str, raw_body: &[u8]) -> Result<NormalizedRequest, NormalizeError> {
    normalize_raw(RawRequest::new(raw_path, None, Bytes::copy_from_slice(raw_body)))
}

/// Normalize an already buffered raw request, keeping it for later copies.
pub fn normalize_raw(raw: RawRequest) -> Result<NormalizedRequest, NormalizeError> {
    let path = raw
        .path
        .strip_prefix(API_PREFIX)
        .ok_or_else(|| NormalizeError::InvalidPath(raw.path.clone()))?
        .to_string();

    let parsed = if raw.body.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice::<Value>(&raw.body)
            .map_err(|e| NormalizeError::MalformedBody(e.to_string()))?
    };

    let (body_json, body, is_batch) = match parsed {
        Value::Array(mut parts) => {
            match parts.len() {
                0 => return Err(NormalizeError::EmptyBatch),
                1 => {}
                n => tracing::warn!(
                    parts = n,
                    "Batch requests with more than 1 element aren't supported, only the first element will be handled"
                ),
            }
            tracing::debug!("Converting batch request to single request");

            let first = parts.swap_remove(0);
            let body_json = into_object(first)?;
            let body = serde_json::to_vec(&body_json)
                .map_err(|e| NormalizeError::MalformedBody(e.to_string()))?;
            (body_json, Bytes::from(body), true)
        }
        other => (into_object(other)?, raw.body.clone(), false),
    };

    Ok(NormalizedRequest {
        path,
        query: raw.query.clone(),
        body_json,
        is_batch,
        request_id: String::new(),
        body,
        raw,
    })
}

fn into_object(value: Value) -> Result<Map<String, Value>, NormalizeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(NormalizeError::BodyNotObject(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs.contents())
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_single_object_body() {
        let req = normalize("/_ah/api/foo", br#"{"a":1}"#).unwrap();
        assert_eq!(req.path, "foo");
        assert!(!req.is_batch);
        assert!(!req.is_rpc());
        assert_eq!(req.body_json, object(json!({"a": 1})));
        assert_eq!(req.request_id, "");
        assert_eq!(req.body_bytes().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_empty_body_is_empty_map() {
        let req = normalize("/_ah/api/guestbook/v1/greetings", b"").unwrap();
        assert_eq!(req.path, "guestbook/v1/greetings");
        assert!(req.body_json.is_empty());
        assert!(!req.is_batch);
    }

    #[test]
    fn test_single_element_batch() {
        let req = normalize("/_ah/api/rpc", br#"[{"a":1}]"#).unwrap();
        assert!(req.is_batch);
        assert!(req.is_rpc());
        assert_eq!(req.body_json, object(json!({"a": 1})));
        assert_eq!(req.body_bytes().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_multi_element_batch_uses_first() {
        let (req, logs) = with_captured_logs(|| normalize("/_ah/api/rpc", br#"[{"a":1},{"b":2}]"#));
        let req = req.unwrap();
        assert!(req.is_batch);
        assert_eq!(req.body_json, object(json!({"a": 1})));
        assert_eq!(req.body_bytes().as_ref(), br#"{"a":1}"#);

        assert!(logs.contains("WARN"), "expected a warning, got: {logs}");
        assert!(logs.contains("parts=2"), "expected the element count, got: {logs}");
    }

    #[test]
    fn test_single_element_batch_does_not_warn() {
        let (req, logs) = with_captured_logs(|| normalize("/_ah/api/rpc", br#"[{"a":1}]"#));
        assert!(req.unwrap().is_batch);
        assert!(!logs.contains("WARN"), "unexpected warning: {logs}");
    }

    #[test]
    fn test_empty_batch() {
        let err = normalize("/_ah/api/rpc", b"[]").unwrap_err();
        assert_eq!(err, NormalizeError::EmptyBatch);
    }

    #[test]
    fn test_invalid_path() {
        let err = normalize("/api/foo", b"{}").unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidPath(ref p) if p == "/api/foo"));

        let err = normalize("/_ah/api", b"{}").unwrap_err();
        assert_eq!(err.kind(), "invalid_path");
    }

    #[test]
    fn test_malformed_body() {
        let err = normalize("/_ah/api/foo", b"{not json").unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedBody(_)));
    }

    #[test]
    fn test_body_not_object() {
        let err = normalize("/_ah/api/foo", b"42").unwrap_err();
        assert!(matches!(err, NormalizeError::BodyNotObject(_)));

        let err = normalize("/_ah/api/foo", br#"["a"]"#).unwrap_err();
        assert!(matches!(err, NormalizeError::BodyNotObject(ref v) if v == "\"a\""));
    }

    #[test]
    fn test_rpc_only_exact_path() {
        assert!(!normalize("/_ah/api/rpc/x", b"").unwrap().is_rpc());
        assert!(!normalize("/_ah/api/RPC", b"").unwrap().is_rpc());
    }

    #[test]
    fn test_copy_is_idempotent() {
        let req = normalize("/_ah/api/rpc", br#"[{"method":"greetings.get","id":"x"}]"#)
            .unwrap()
            .with_request_id("abc");

        let first = req.copy().unwrap();
        let second = req.copy().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, req);
        assert_eq!(first.body_json, second.body_json);
        assert_eq!(first.is_batch, second.is_batch);
        assert_eq!(second.request_id, "abc");
    }

    #[test]
    fn test_rpc_id() {
        let req = normalize("/_ah/api/rpc", br#"{"id": "gapiRpc", "method": "m"}"#).unwrap();
        assert_eq!(req.rpc_id(), Some(json!("gapiRpc")));

        let req = normalize("/_ah/api/rpc", b"{}").unwrap();
        assert_eq!(req.rpc_id(), None);

        let req = normalize("/_ah/api/rpc", br#"{"id": null}"#).unwrap();
        assert_eq!(req.rpc_id(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_body_views_are_independent() {
        let raw = RawRequest::buffer("/_ah/api/foo", None, Body::from(r#"{"a":1}"#), 1024)
            .await
            .unwrap();
        let req = normalize_raw(raw).unwrap();

        let first = axum::body::to_bytes(req.body(), 1024).await.unwrap();
        let second = axum::body::to_bytes(req.body(), 1024).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_ref(), br#"{"a":1}"#);

        let raw_view = axum::body::to_bytes(req.raw().body(), 1024).await.unwrap();
        assert_eq!(raw_view, first);
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let err = RawRequest::buffer("/_ah/api/foo", None, Body::from(vec![b'x'; 64]), 16)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreadable_body");
    }
}
