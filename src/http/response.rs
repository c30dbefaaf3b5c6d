//! Response construction.
//!
//! # Responsibilities
//! - Merge the request's CORS decision into every response
//! - Emit not-found, error, rejection and redirect responses
//! - Wrap backend results in the REST or JSON-RPC envelope
//!
//! # Design Decisions
//! - CORS headers are applied before status and body are set
//! - Content-Length always matches the serialized body exactly
//! - Every send returns the body text written, for logging and tests

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde_json::{json, Map, Value};

use crate::error::RequestError;
use crate::http::cors::{CorsDecision, CorsPolicy};
use crate::http::request::NormalizedRequest;

/// A response ready to send, plus the body text it carries.
#[derive(Debug)]
pub struct Sent {
    pub response: Response<Body>,
    pub body: String,
}

impl Sent {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }
}

/// Builds CORS-aware responses for a single request.
#[derive(Debug, Clone, Copy)]
pub struct ResponseWriter<'a> {
    policy: &'a CorsPolicy,
    decision: Option<&'a CorsDecision>,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(policy: &'a CorsPolicy, decision: Option<&'a CorsDecision>) -> Self {
        Self { policy, decision }
    }

    /// 404 with a plain-text body.
    pub fn send_not_found(&self) -> Sent {
        self.send(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    }

    /// 500 with `{"error":{"message": ...}}`.
    pub fn send_error(&self, message: &str) -> Sent {
        let body = json!({ "error": { "message": message } }).to_string();
        self.send(StatusCode::INTERNAL_SERVER_ERROR, "application/json", body)
    }

    /// 400 with the caller's rejection payload serialized as-is.
    pub fn send_rejected(&self, rejection: &Value) -> Sent {
        self.send(StatusCode::BAD_REQUEST, "application/json", rejection.to_string())
    }

    /// 302 to `location`. The body is left to the transport.
    pub fn send_redirect(&self, location: &str) -> Sent {
        let location = match HeaderValue::from_str(location) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(location = %location, "Redirect location is not a valid header value");
                return self.send_error("Invalid redirect location");
            }
        };

        let mut response = Response::new(Body::empty());
        self.apply_cors(&mut response);
        *response.status_mut() = StatusCode::FOUND;
        response.headers_mut().insert(header::LOCATION, location);
        Sent {
            response,
            body: String::new(),
        }
    }

    /// JSON body with an arbitrary status, as returned to REST callers.
    pub fn send_json(&self, status: StatusCode, body: String) -> Sent {
        self.send(status, "application/json", body)
    }

    /// Render a backend or validation error the way the gateway would.
    ///
    /// JSON-RPC errors are reported with `200 OK` and the error in the body.
    pub fn send_request_error(&self, request: &NormalizedRequest, error: &RequestError) -> Sent {
        if request.is_rpc() {
            let mut envelope = error.rpc_error();
            insert_rpc_id(&mut envelope, request);
            let body = finish_batch(request.is_batch, Value::Object(envelope));
            return self.send_json(StatusCode::OK, body.to_string());
        }

        let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.send_json(status, error.rest_error())
    }

    /// Wrap a successful backend result for the caller.
    ///
    /// Only JSON-RPC envelopes are re-wrapped for batch requests. REST
    /// results go out exactly as the backend returned them.
    pub fn send_backend_result(&self, request: &NormalizedRequest, result: Value) -> Sent {
        let body = if request.is_rpc() {
            let mut envelope = Map::new();
            insert_rpc_id(&mut envelope, request);
            envelope.insert("result".into(), result);
            finish_batch(request.is_batch, Value::Object(envelope))
        } else {
            result
        };
        self.send_json(StatusCode::OK, body.to_string())
    }

    /// 200 with no body, answering a CORS preflight.
    pub fn send_preflight(&self) -> Sent {
        self.send(StatusCode::OK, "text/plain", String::new())
    }

    fn send(&self, status: StatusCode, content_type: &'static str, body: String) -> Sent {
        let mut response = Response::new(Body::from(body.clone()));
        self.apply_cors(&mut response);

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        *response.status_mut() = status;

        Sent { response, body }
    }

    fn apply_cors(&self, response: &mut Response<Body>) {
        if let Some(decision) = self.decision {
            self.policy.apply(decision, response.headers_mut());
        }
    }
}

fn insert_rpc_id(envelope: &mut Map<String, Value>, request: &NormalizedRequest) {
    if let Some(id) = request.rpc_id() {
        envelope.insert("id".into(), id);
    }
}

fn finish_batch(is_batch: bool, body: Value) -> Value {
    if is_batch {
        Value::Array(vec![body])
    } else {
        body
    }
}
