//! HTTP server setup and request pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Evaluate CORS, normalize the request, dispatch to the backend
//! - Render every failure as a gateway-shaped response

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, Response},
    routing::any,
    Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::backend::{DispatchError, Dispatcher, HttpDispatcher};
use crate::config::{EmulatorConfig, ExplorerConfig};
use crate::error::{RequestError, StatusCodeMap};
use crate::http::cors::CorsPolicy;
use crate::http::request::{normalize_raw, NormalizeError, RawRequest, API_PREFIX, RPC_PATH};
use crate::http::response::{ResponseWriter, Sent};
use crate::observability::metrics;

/// Path that redirects to the hosted API explorer.
pub const EXPLORER_PATH: &str = "/_ah/api/explorer";

const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub cors: Arc<CorsPolicy>,
    pub status_map: Arc<StatusCodeMap>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub explorer: ExplorerConfig,
    pub max_body_size: usize,
}

/// HTTP front end of the emulator.
pub struct HttpServer {
    router: Router,
    config: EmulatorConfig,
}

impl HttpServer {
    /// Create a server forwarding to the configured HTTP backend.
    pub fn new(config: EmulatorConfig) -> Self {
        let dispatcher = Arc::new(HttpDispatcher::new(&config.backend));
        Self::with_dispatcher(config, dispatcher)
    }

    /// Create a server with a custom backend dispatcher.
    pub fn with_dispatcher(config: EmulatorConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let state = AppState {
            cors: Arc::new(CorsPolicy::default()),
            status_map: Arc::new(StatusCodeMap::default()),
            dispatcher,
            explorer: config.explorer.clone(),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EmulatorConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown channel fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.address,
            "HTTP server starting"
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }
}

/// Entry point for every request.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let decision = state.cors.evaluate_headers(request.headers());
    let writer = ResponseWriter::new(&state.cors, Some(&decision));

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        cors_allowed = decision.allowed,
        "Handling request"
    );

    let sent = handle_request(&state, &writer, request, &request_id).await;

    let status = sent.status().as_u16();
    metrics::record_request(method.as_str(), status, start_time);
    tracing::debug!(
        request_id = %request_id,
        status = status,
        body_len = sent.body.len(),
        "Response written"
    );

    sent.response
}

async fn handle_request(
    state: &AppState,
    writer: &ResponseWriter<'_>,
    request: Request<Body>,
    request_id: &str,
) -> Sent {
    if request.method() == Method::OPTIONS {
        return writer.send_preflight();
    }

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    if state.explorer.enabled && path == EXPLORER_PATH {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let location = format!("{}?base=http://{}/_ah/api", state.explorer.url, host);
        return writer.send_redirect(&location);
    }

    let is_rpc_path = path.strip_prefix(API_PREFIX) == Some(RPC_PATH);
    let query = parts.uri.query().map(str::to_string);

    let normalized = match RawRequest::buffer(path, query, body, state.max_body_size).await {
        Ok(raw) => normalize_raw(raw),
        Err(e) => Err(e),
    };
    let request = match normalized {
        Ok(request) => request.with_request_id(request_id),
        Err(e) => return reject(writer, &e, is_rpc_path, request_id),
    };

    match state.dispatcher.dispatch(&request).await {
        Ok(body) => {
            let result = if body.is_empty() {
                Value::Object(Map::new())
            } else {
                match serde_json::from_slice::<Value>(&body) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::error!(request_id = %request_id, error = %e, "Backend returned non-JSON body");
                        return writer.send_error(&format!("Non-JSON reply from backend: {}", e));
                    }
                }
            };
            writer.send_backend_result(&request, result)
        }
        Err(DispatchError::Upstream(upstream)) => {
            metrics::record_backend_error(upstream.status);
            let error = RequestError::backend(&state.status_map, &upstream);
            tracing::warn!(
                request_id = %request_id,
                upstream_status = upstream.status,
                status = error.status_code(),
                error = %error,
                "Backend error"
            );
            writer.send_request_error(&request, &error)
        }
        Err(DispatchError::Transport(message)) => writer.send_error(&message),
    }
}

/// Answer a request that failed normalization; the backend is never called.
fn reject(writer: &ResponseWriter<'_>, error: &NormalizeError, is_rpc: bool, request_id: &str) -> Sent {
    metrics::record_rejection(error.kind());
    tracing::warn!(request_id = %request_id, kind = error.kind(), error = %error, "Request rejected");

    let rejection = match error {
        NormalizeError::InvalidPath(_) => return writer.send_not_found(),
        NormalizeError::UnreadableBody(_) => return writer.send_error(&error.to_string()),
        NormalizeError::MalformedBody(_) => RequestError::generic(400, "parseError", "Parse Error"),
        NormalizeError::EmptyBatch | NormalizeError::BodyNotObject(_) => {
            RequestError::generic(400, "badRequest", error.to_string())
        }
    };

    let payload = if is_rpc {
        Value::Object(rejection.rpc_error())
    } else {
        rejection.rest_value()
    };
    writer.send_rejected(&payload)
}
