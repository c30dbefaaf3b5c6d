//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → cors.rs (CORS decision from request headers)
//!     → request.rs (buffer body, strip prefix, unwrap batch)
//!     → [backend dispatcher]
//!     → response.rs (CORS headers + body / gateway error)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use cors::{CorsDecision, CorsPolicy};
pub use request::{normalize, NormalizeError, NormalizedRequest, RawRequest};
pub use response::{ResponseWriter, Sent};
pub use server::HttpServer;
