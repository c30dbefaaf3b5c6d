//! HTTP forwarding to the backend.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;

use crate::backend::{DispatchError, Dispatcher};
use crate::config::BackendConfig;
use crate::error::UpstreamResponse;
use crate::http::request::NormalizedRequest;

/// Upper bound on buffered backend response bodies.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Forwards canonical requests to a backend over HTTP/1.1.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: Client<HttpConnector, Body>,
    address: String,
    spi_prefix: String,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            address: config.address.clone(),
            spi_prefix: config.spi_prefix.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Backend URI for a canonical request path.
    pub fn target_uri(&self, request: &NormalizedRequest) -> String {
        let mut uri = format!("http://{}{}{}", self.address, self.spi_prefix, request.path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query);
        }
        uri
    }

    fn build_request(&self, request: &NormalizedRequest) -> Result<Request<Body>, DispatchError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.target_uri(request))
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !request.request_id.is_empty() {
            builder = builder.header("x-request-id", request.request_id.as_str());
        }

        builder
            .body(request.body())
            .map_err(|e| DispatchError::Transport(format!("Invalid backend request: {}", e)))
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &NormalizedRequest) -> Result<Bytes, DispatchError> {
        let outbound = self.build_request(request)?;

        tracing::debug!(
            request_id = %request.request_id,
            uri = %outbound.uri(),
            "Dispatching to backend"
        );

        let response = match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request.request_id, error = %e, "Backend request failed");
                return Err(DispatchError::Transport(e.to_string()));
            }
            Err(_) => {
                tracing::error!(request_id = %request.request_id, timeout = ?self.timeout, "Backend timed out");
                return Err(DispatchError::Transport(format!(
                    "Backend did not respond within {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let status = response.status();
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(DispatchError::Upstream(UpstreamResponse::new(status.as_u16(), body)))
        }
    }
}
