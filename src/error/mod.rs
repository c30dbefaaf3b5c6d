//! Gateway error taxonomy.
//!
//! # Data Flow
//! ```text
//! RequestError (Generic | EnumRejection | Backend)
//!     → record() (status, message, reason, domain, extra fields)
//!     → format_error(tag)
//!         → rest_error()  "errors" list, pretty JSON string
//!         → rpc_error()   "data" list, JSON map
//! ```
//!
//! # Design Decisions
//! - Closed enum; variants only differ in how they fill the shared record
//! - Backend status/reason come from the StatusCodeMap, not the upstream
//! - Keys render sorted so output is byte-for-byte stable

pub mod status_map;

use axum::body::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

pub use status_map::{ErrorInfo, StatusCodeMap};

pub const DEFAULT_DOMAIN: &str = "global";

/// Tag used for the error list in REST responses.
pub const REST_ERROR_TAG: &str = "errors";
/// Tag used for the error list in JSON-RPC responses.
pub const RPC_ERROR_TAG: &str = "data";

/// A raw (status, body) pair received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Error returned when the backend answers with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub upstream_status: u16,
    pub info: ErrorInfo,
    pub message: String,
}

impl BackendError {
    /// Convert a backend failure to whatever the live gateway would return.
    pub fn from_upstream(map: &StatusCodeMap, upstream: &UpstreamResponse) -> Self {
        Self {
            upstream_status: upstream.status,
            info: map.lookup(upstream.status).clone(),
            message: upstream_message(&upstream.body),
        }
    }
}

/// `error_message` from a JSON body, or the raw body text.
fn upstream_message(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => match fields.get("error_message") {
            Some(Value::String(message)) => message.clone(),
            _ => String::from_utf8_lossy(body).into_owned(),
        },
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Errors that happen while processing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{message}")]
    Generic {
        status_code: u16,
        message: String,
        reason: String,
        domain: String,
    },

    /// An enum parameter had a value outside its allowed set.
    #[error("Invalid string value: {value}. Allowed values: {}", list_values(.allowed_values))]
    EnumRejection {
        parameter_name: String,
        value: String,
        allowed_values: Vec<String>,
    },

    #[error("{0}")]
    Backend(BackendError),
}

fn list_values(values: &[String]) -> String {
    format!("[{}]", values.join(" "))
}

/// Fields shared by every error variant, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub status_code: u16,
    pub message: String,
    pub reason: String,
    pub domain: String,
    pub extra_fields: Map<String, Value>,
}

impl ErrorRecord {
    /// Format this error into the gateway's JSON error envelope.
    pub fn format_error(&self, error_list_tag: &str) -> Map<String, Value> {
        let mut detail = Map::new();
        detail.insert("domain".into(), Value::from(self.domain.as_str()));
        detail.insert("reason".into(), Value::from(self.reason.as_str()));
        detail.insert("message".into(), Value::from(self.message.as_str()));
        for (key, value) in &self.extra_fields {
            detail.insert(key.clone(), value.clone());
        }

        let mut error = Map::new();
        error.insert(error_list_tag.into(), Value::Array(vec![Value::Object(detail)]));
        error.insert("code".into(), Value::from(self.status_code));
        error.insert("message".into(), Value::from(self.message.as_str()));

        let mut envelope = Map::new();
        envelope.insert("error".into(), Value::Object(error));
        envelope
    }
}

impl RequestError {
    pub fn generic(status_code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generic {
            status_code,
            message: message.into(),
            reason: reason.into(),
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }

    pub fn enum_rejection(
        parameter_name: impl Into<String>,
        value: impl Into<String>,
        allowed_values: Vec<String>,
    ) -> Self {
        Self::EnumRejection {
            parameter_name: parameter_name.into(),
            value: value.into(),
            allowed_values,
        }
    }

    pub fn backend(map: &StatusCodeMap, upstream: &UpstreamResponse) -> Self {
        Self::Backend(BackendError::from_upstream(map, upstream))
    }

    /// HTTP status code the gateway responds with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Generic { status_code, .. } => *status_code,
            Self::EnumRejection { .. } => 400,
            Self::Backend(err) => err.info.http_status,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        match self {
            Self::Generic {
                status_code,
                message,
                reason,
                domain,
            } => ErrorRecord {
                status_code: *status_code,
                message: message.clone(),
                reason: reason.clone(),
                domain: domain.clone(),
                extra_fields: Map::new(),
            },
            Self::EnumRejection { parameter_name, .. } => {
                let mut extra_fields = Map::new();
                extra_fields.insert("locationType".into(), Value::from("parameter"));
                extra_fields.insert("location".into(), Value::from(parameter_name.as_str()));
                ErrorRecord {
                    status_code: 400,
                    message: self.to_string(),
                    reason: "invalidParameter".to_string(),
                    domain: DEFAULT_DOMAIN.to_string(),
                    extra_fields,
                }
            }
            Self::Backend(err) => ErrorRecord {
                status_code: err.info.http_status,
                message: err.message.clone(),
                reason: err.info.reason.to_string(),
                domain: err.info.domain.to_string(),
                extra_fields: Map::new(),
            },
        }
    }

    /// Format this error into a response to a REST request.
    pub fn rest_error(&self) -> String {
        format!("{:#}", self.rest_value())
    }

    /// REST rendering as a JSON value, for callers that re-serialize it.
    pub fn rest_value(&self) -> Value {
        Value::Object(self.record().format_error(REST_ERROR_TAG))
    }

    /// Format this error into a response to a JSON-RPC request.
    pub fn rpc_error(&self) -> Map<String, Value> {
        self.record().format_error(RPC_ERROR_TAG)
    }
}
