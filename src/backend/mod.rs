//! Backend dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! NormalizedRequest (canonical path + body)
//!     → Dispatcher::dispatch
//!         → client.rs (HTTP POST to the backend's SPI prefix)
//!     → Ok(body bytes)                      2xx
//!     → Err(DispatchError::Upstream(..))    non-2xx, re-wrapped as BackendError
//!     → Err(DispatchError::Transport(..))   connection failure or timeout
//! ```
//!
//! # Design Decisions
//! - The dispatcher only forwards; method routing belongs to the backend
//! - Upstream bodies are fully buffered so errors can be re-rendered

pub mod client;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

use crate::error::UpstreamResponse;
use crate::http::request::NormalizedRequest;

pub use client::HttpDispatcher;

/// Reasons a dispatch did not produce a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Backend answered with a non-success status.
    #[error("Backend returned status {}", .0.status)]
    Upstream(UpstreamResponse),

    /// Backend could not be reached or did not answer in time.
    #[error("Backend transport error: {0}")]
    Transport(String),
}

/// Hands normalized requests to the service implementation.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &NormalizedRequest) -> Result<Bytes, DispatchError>;
}
